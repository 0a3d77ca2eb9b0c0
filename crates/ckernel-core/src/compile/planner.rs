//! Build planning: staleness tracking and command assembly.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use rustc_hash::FxHashMap;

use super::graph::{LinkGraph, LinkNode};
use super::types::{
    Artifact, BuildConfig, BuildMode, BuildPlan, BuildStep, CompilationUnit, Fingerprint, RunSpec,
    StepKind,
};
use crate::error::{Error, Result};
use crate::paths::WorkArea;
use crate::settings::KernelSettings;

/// Decides what must be (re)compiled or relinked.
///
/// Owns every saved compilation unit of a session together with the
/// fingerprints of the artifacts built from them. A step only counts as built
/// once [`BuildPlanner::record`] is called for it, so a failed compile leaves
/// its unit stale.
pub struct BuildPlanner {
    root: PathBuf,
    src_dir: PathBuf,
    obj_dir: PathBuf,
    bin_dir: PathBuf,

    /// Defaults for executed targets.
    settings: KernelSettings,

    /// Saved units by target name.
    units: FxHashMap<String, CompilationUnit>,

    /// Last successful link per target.
    links: FxHashMap<String, Artifact>,

    next_declaration: usize,
}

impl BuildPlanner {
    pub fn new(area: &WorkArea, settings: KernelSettings) -> Self {
        Self {
            root: area.root.clone(),
            src_dir: area.src_dir.clone(),
            obj_dir: area.obj_dir.clone(),
            bin_dir: area.bin_dir.clone(),
            settings,
            units: FxHashMap::default(),
            links: FxHashMap::default(),
            next_declaration: 0,
        }
    }

    /// Save a cell's source and register (or update) its compilation unit.
    pub fn save(&mut self, config: &BuildConfig, source: &str) -> Result<&CompilationUnit> {
        let source_path = self.src_dir.join(config.source_file_name());
        fs::write(&source_path, source)?;

        let flags = self.effective_compile_flags(config);
        let fingerprint = Fingerprint::of_unit(
            source.as_bytes(),
            config.language,
            &config.compiler_path,
            &flags,
        );
        let object_path = self.obj_dir.join(config.object_file_name());

        let name = config.target_name.clone();
        match self.units.get_mut(&name) {
            Some(unit) => {
                if unit.source_path != source_path && unit.source_path.exists() {
                    let _ = fs::remove_file(&unit.source_path);
                }
                unit.config = config.clone();
                unit.source_path = source_path;
                unit.object_path = object_path;
                unit.flags = flags;
                unit.fingerprint = fingerprint;
            }
            None => {
                let declared_at = self.next_declaration;
                self.next_declaration += 1;
                self.units.insert(
                    name.clone(),
                    CompilationUnit {
                        config: config.clone(),
                        source_path,
                        object_path,
                        flags,
                        fingerprint,
                        artifact: None,
                        declared_at,
                    },
                );
            }
        }

        tracing::debug!("Saved cell '{}' (fingerprint {})", name, fingerprint);
        self.units
            .get(&name)
            .ok_or_else(|| Error::UnknownTarget(name.clone()))
    }

    /// Look up a saved unit.
    pub fn unit(&self, target: &str) -> Option<&CompilationUnit> {
        self.units.get(target)
    }

    /// All saved units in declaration order.
    pub fn units(&self) -> Vec<&CompilationUnit> {
        let mut units: Vec<_> = self.units.values().collect();
        units.sort_by_key(|u| u.declared_at);
        units
    }

    /// Plan the steps needed to bring `targets` up to date.
    ///
    /// At most one target may be in [`BuildMode::CompileAndRun`]; it gets its
    /// transitive dependencies compiled and a link step when stale.
    /// [`BuildMode::CompileOnly`] targets contribute only their own unit and
    /// [`BuildMode::Skip`] targets nothing.
    pub fn plan(&mut self, targets: &[BuildConfig]) -> Result<BuildPlan> {
        let mut run_target: Option<&BuildConfig> = None;
        let mut needed: Vec<String> = Vec::new();

        for config in targets {
            let unit = self
                .units
                .get_mut(&config.target_name)
                .ok_or_else(|| Error::UnknownTarget(config.target_name.clone()))?;
            if unit.config != *config {
                unit.config = config.clone();
            }

            match config.mode {
                BuildMode::Skip => {}
                BuildMode::CompileOnly => {
                    // Nothing is linked, but declared dependencies must still resolve.
                    self.link_graph(config)?;
                    push_unique(&mut needed, &config.target_name);
                }
                BuildMode::CompileAndRun => {
                    if let Some(previous) = run_target {
                        return Err(Error::Configuration(format!(
                            "only one target can run per plan, got '{}' and '{}'",
                            previous.target_name, config.target_name
                        )));
                    }
                    run_target = Some(config);
                }
            }
        }

        let mut link_inputs = Vec::new();
        if let Some(run) = run_target {
            let graph = self.link_graph(run)?;
            let root = LinkNode::Unit(run.target_name.clone());
            for node in graph.requirements(&root) {
                if let LinkNode::Unit(name) = &node {
                    push_unique(&mut needed, name);
                }
                link_inputs.push(node);
            }
            push_unique(&mut needed, &run.target_name);
        }

        for name in &needed {
            self.refresh(name)?;
        }

        let mut stale: Vec<&CompilationUnit> = needed
            .iter()
            .filter_map(|name| self.units.get(name))
            .filter(|unit| unit.is_stale())
            .collect();
        stale.sort_by_key(|unit| unit.declared_at);

        let mut plan = BuildPlan::default();
        for unit in &stale {
            check_compiler(&unit.config)?;
            plan.compiles.push(self.compile_step(unit));
        }

        if let Some(run) = run_target {
            let executable = self.bin_dir.join(&run.target_name);
            let link = self.link_step(run, &link_inputs, &executable)?;

            let inputs_stale = stale.iter().any(|unit| {
                unit.target_name() == run.target_name
                    || link_inputs.contains(&LinkNode::Unit(unit.target_name().to_string()))
            });
            let recorded = self.links.get(&run.target_name);
            let link_stale = inputs_stale
                || !executable.exists()
                || recorded.map(|a| a.fingerprint) != Some(link.fingerprint);

            if link_stale {
                check_compiler(run)?;
                plan.link = Some(link);
            }

            plan.run = Some(RunSpec {
                target: run.target_name.clone(),
                executable,
                args: run.args.clone(),
                cwd: self.root.clone(),
            });
        }

        tracing::debug!(
            "Planned {} compile step(s), {} link step(s)",
            plan.compiles.len(),
            usize::from(plan.link.is_some())
        );
        Ok(plan)
    }

    /// Record a step that ran successfully.
    pub fn record(&mut self, step: &BuildStep) {
        let artifact = Artifact {
            path: step.output.clone(),
            fingerprint: step.fingerprint,
        };
        match step.kind {
            StepKind::Compile => {
                if let Some(unit) = self.units.get_mut(&step.target) {
                    unit.artifact = Some(artifact);
                }
            }
            StepKind::Link => {
                self.links.insert(step.target.clone(), artifact);
            }
        }
    }

    /// Forget every recorded artifact, forcing a full rebuild.
    pub fn invalidate_all(&mut self) {
        for unit in self.units.values_mut() {
            unit.artifact = None;
        }
        self.links.clear();
    }

    /// Re-read a unit's saved source and recompute its fingerprint.
    fn refresh(&mut self, name: &str) -> Result<()> {
        let flags = match self.units.get(name) {
            Some(unit) => self.effective_compile_flags(&unit.config),
            None => return Err(Error::UnknownTarget(name.to_string())),
        };
        let Some(unit) = self.units.get_mut(name) else {
            return Err(Error::UnknownTarget(name.to_string()));
        };

        let source = fs::read(&unit.source_path)?;
        unit.fingerprint = Fingerprint::of_unit(
            &source,
            unit.config.language,
            &unit.config.compiler_path,
            &flags,
        );
        unit.flags = flags;
        Ok(())
    }

    /// Build the graph of everything `run` links against.
    fn link_graph(&self, run: &BuildConfig) -> Result<LinkGraph> {
        let mut graph = LinkGraph::new();
        let root = LinkNode::Unit(run.target_name.clone());
        graph.add_node(root.clone());

        let mut pending = vec![(root, run)];
        while let Some((node, config)) = pending.pop() {
            for dep in &config.depends {
                let requirement = self.resolve_dependency(config, dep)?;
                let seen = graph.contains(&requirement);
                graph.add_requirement(&node, &requirement);

                if !seen && let LinkNode::Unit(name) = &requirement {
                    let dep_config = self
                        .units
                        .get(name)
                        .map(|unit| &unit.config)
                        .ok_or_else(|| Error::UnknownTarget(name.clone()))?;
                    pending.push((requirement.clone(), dep_config));
                }
            }
        }

        graph.detect_cycles()?;
        Ok(graph)
    }

    /// Resolve a declared dependency name to a unit or an existing file.
    fn resolve_dependency(&self, config: &BuildConfig, dep: &str) -> Result<LinkNode> {
        let stem = dep.strip_suffix(".o").unwrap_or(dep);
        let unit = self.units.values().find(|unit| {
            unit.config.object_file_name() == dep || unit.target_name() == stem
        });

        if let Some(unit) = unit {
            if unit.config.mode == BuildMode::Skip {
                return Err(Error::Configuration(format!(
                    "target '{}' depends on '{}', but cell '{}' is save-only",
                    config.target_name,
                    dep,
                    unit.target_name()
                )));
            }
            return Ok(LinkNode::Unit(unit.target_name().to_string()));
        }

        let mut candidates = Vec::new();
        let path = Path::new(dep);
        if path.is_absolute() {
            candidates.push(path.to_path_buf());
        } else {
            candidates.push(self.root.join(path));
            candidates.push(self.obj_dir.join(path));
            candidates.extend(
                library_dirs(&config.linker_flags)
                    .into_iter()
                    .map(|dir| dir.join(path)),
            );
        }

        candidates
            .into_iter()
            .find(|candidate| candidate.is_file())
            .map(LinkNode::External)
            .ok_or_else(|| Error::UnresolvedDependency {
                target: config.target_name.clone(),
                name: dep.to_string(),
            })
    }

    fn compile_step(&self, unit: &CompilationUnit) -> BuildStep {
        let mut args = unit.flags.clone();
        args.push("-c".to_string());
        args.push(unit.source_path.to_string_lossy().into_owned());
        args.push("-o".to_string());
        args.push(unit.object_path.to_string_lossy().into_owned());

        BuildStep {
            kind: StepKind::Compile,
            target: unit.target_name().to_string(),
            program: unit.config.compiler_path.clone(),
            args,
            cwd: self.root.clone(),
            output: unit.object_path.clone(),
            fingerprint: unit.fingerprint,
            echo: unit.config.verbose,
        }
    }

    fn link_step(
        &self,
        run: &BuildConfig,
        inputs: &[LinkNode],
        executable: &Path,
    ) -> Result<BuildStep> {
        let own = self
            .units
            .get(&run.target_name)
            .ok_or_else(|| Error::UnknownTarget(run.target_name.clone()))?;

        let mut hasher = DefaultHasher::new();
        run.compiler_path.hash(&mut hasher);
        own.flags.hash(&mut hasher);
        own.fingerprint.hash(&mut hasher);

        let mut args = own.flags.clone();
        args.push(own.object_path.to_string_lossy().into_owned());

        for input in inputs {
            match input {
                LinkNode::Unit(name) => {
                    let unit = self
                        .units
                        .get(name)
                        .ok_or_else(|| Error::UnknownTarget(name.clone()))?;
                    unit.fingerprint.hash(&mut hasher);
                    args.push(unit.object_path.to_string_lossy().into_owned());
                }
                LinkNode::External(path) => {
                    file_stamp(path).hash(&mut hasher);
                    args.push(path.to_string_lossy().into_owned());
                }
            }
        }

        let ldflags = self.effective_link_flags(run);
        ldflags.hash(&mut hasher);
        args.extend(ldflags);
        args.push("-o".to_string());
        args.push(executable.to_string_lossy().into_owned());

        Ok(BuildStep {
            kind: StepKind::Link,
            target: run.target_name.clone(),
            program: run.compiler_path.clone(),
            args,
            cwd: self.root.clone(),
            output: executable.to_path_buf(),
            fingerprint: Fingerprint(hasher.finish()),
            echo: run.verbose,
        })
    }

    fn effective_compile_flags(&self, config: &BuildConfig) -> Vec<String> {
        let mut flags = Vec::new();
        if config.mode == BuildMode::CompileAndRun {
            flags.extend_from_slice(self.settings.exe_compile_flags(config.language));
        }
        flags.extend(config.compiler_flags.iter().cloned());
        flags
    }

    fn effective_link_flags(&self, config: &BuildConfig) -> Vec<String> {
        let mut flags = self.settings.exe_ldflags.clone();
        flags.extend(config.linker_flags.iter().cloned());
        flags
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Fail fast when a compiler cannot be found.
fn check_compiler(config: &BuildConfig) -> Result<()> {
    which::which(&config.compiler_path)
        .map(|_| ())
        .map_err(|_| Error::CompilerNotFound {
            target: config.target_name.clone(),
            path: config.compiler_path.clone(),
        })
}

/// Directories named by `-L<dir>` or `-L <dir>` linker flags.
fn library_dirs(flags: &[String]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        if flag == "-L" {
            if let Some(dir) = iter.next() {
                dirs.push(PathBuf::from(dir));
            }
        } else if let Some(dir) = flag.strip_prefix("-L") {
            dirs.push(PathBuf::from(dir));
        }
    }
    dirs
}

/// Size and modification time of an external object.
fn file_stamp(path: &Path) -> (u64, u128) {
    fs::metadata(path)
        .map(|meta| {
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or_default();
            (meta.len(), modified)
        })
        .unwrap_or_default()
}
