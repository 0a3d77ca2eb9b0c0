//! Common types for the build pipeline.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Source language of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    #[serde(alias = "c++", alias = "cxx")]
    Cpp,
}

impl Language {
    /// File extension used when saving a cell of this language.
    pub fn extension(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Infer the language from a source file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(Language::C),
            "cpp" | "cxx" | "cc" | "C" => Some(Language::Cpp),
            _ => None,
        }
    }
}

/// What running a cell does after its source is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    /// Produce an object file only.
    CompileOnly,
    /// Compile, link and execute.
    CompileAndRun,
    /// Save the source only, never compile.
    Skip,
}

/// Build configuration for one cell.
///
/// Produced upstream from the cell's option comments; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Target name. Names the object file and the executable.
    pub target_name: String,

    /// Source language.
    pub language: Language,

    /// Compiler (and linker driver) to invoke.
    pub compiler_path: PathBuf,

    /// Extra compiler flags, in order.
    #[serde(default)]
    pub compiler_flags: Vec<String>,

    /// Extra linker flags, in order.
    #[serde(default)]
    pub linker_flags: Vec<String>,

    /// Declared object-file dependencies (e.g. `util.o`).
    #[serde(default)]
    pub depends: Vec<String>,

    /// Build mode.
    pub mode: BuildMode,

    /// Arguments passed to the program when it runs.
    #[serde(default)]
    pub args: Vec<String>,

    /// Echo build commands to the front-end.
    #[serde(default)]
    pub verbose: bool,

    /// File name to save the source as, when it is not `<target>.<ext>`
    /// (header cells, for instance).
    #[serde(default)]
    pub file_name: Option<String>,
}

impl BuildConfig {
    /// Create a config with no extra flags or dependencies.
    pub fn new(target_name: impl Into<String>, language: Language, compiler: impl Into<PathBuf>) -> Self {
        Self {
            target_name: target_name.into(),
            language,
            compiler_path: compiler.into(),
            compiler_flags: Vec::new(),
            linker_flags: Vec::new(),
            depends: Vec::new(),
            mode: BuildMode::CompileAndRun,
            args: Vec::new(),
            verbose: false,
            file_name: None,
        }
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_compiler_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compiler_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_linker_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.linker_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Declare object-file dependencies. Duplicates are dropped, first
    /// occurrence wins.
    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends.clear();
        for dep in depends {
            let dep = dep.into();
            if !self.depends.contains(&dep) {
                self.depends.push(dep);
            }
        }
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// File name the source is saved under.
    pub fn source_file_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.target_name, self.language.extension()))
    }

    /// File name of the object artifact.
    pub fn object_file_name(&self) -> String {
        format!("{}.o", self.target_name)
    }
}

/// Content fingerprint of a build input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Fingerprint of a compilation unit: source bytes plus everything that
    /// changes the object produced from them.
    pub fn of_unit(source: &[u8], language: Language, compiler: &Path, flags: &[String]) -> Self {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        language.hash(&mut hasher);
        compiler.hash(&mut hasher);
        flags.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// An artifact produced by a successful build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path of the produced file.
    pub path: PathBuf,
    /// Fingerprint of the inputs it was built from.
    pub fingerprint: Fingerprint,
}

/// A saved cell source and the flags that apply to it.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    /// Config the unit was last saved with.
    pub config: BuildConfig,

    /// Saved source file.
    pub source_path: PathBuf,

    /// Where the object file is written.
    pub object_path: PathBuf,

    /// Effective compile flags (defaults plus the cell's own).
    pub flags: Vec<String>,

    /// Fingerprint of the current source and flags.
    pub fingerprint: Fingerprint,

    /// Last produced object, if any.
    pub artifact: Option<Artifact>,

    /// Declaration order, fixed at first save.
    pub declared_at: usize,
}

impl CompilationUnit {
    pub fn target_name(&self) -> &str {
        &self.config.target_name
    }

    /// Whether the unit must be (re)compiled.
    pub fn is_stale(&self) -> bool {
        match &self.artifact {
            Some(artifact) => artifact.fingerprint != self.fingerprint || !artifact.path.exists(),
            None => true,
        }
    }
}

/// Kind of a build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Compile,
    Link,
}

/// One compiler or linker invocation.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub kind: StepKind,

    /// Target the step belongs to.
    pub target: String,

    /// Compiler or linker driver.
    pub program: PathBuf,

    /// Full argument vector.
    pub args: Vec<String>,

    /// Working directory.
    pub cwd: PathBuf,

    /// File the step produces.
    pub output: PathBuf,

    /// Fingerprint recorded on success.
    pub fingerprint: Fingerprint,

    /// Echo the command line to the front-end before running it.
    pub echo: bool,
}

impl BuildStep {
    /// Shell-style rendering of the command, for echoing.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy())
            .chain(self.args.iter().map(|a| std::borrow::Cow::Borrowed(a.as_str())))
            .map(shell_escape::escape)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Program to execute after a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub target: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Ordered output of the planner.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    /// Compiler invocations, in cell declaration order.
    pub compiles: Vec<BuildStep>,

    /// Link invocation, after every compile.
    pub link: Option<BuildStep>,

    /// Program to run once the steps succeed.
    pub run: Option<RunSpec>,
}

impl BuildPlan {
    /// True when no compiler or linker has to run.
    pub fn is_empty(&self) -> bool {
        self.compiles.is_empty() && self.link.is_none()
    }

    /// All steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &BuildStep> {
        self.compiles.iter().chain(self.link.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let config = BuildConfig::new("main", Language::Cpp, "g++");
        assert_eq!(config.source_file_name(), "main.cpp");
        assert_eq!(config.object_file_name(), "main.o");

        let header = BuildConfig::new("util", Language::C, "gcc")
            .with_mode(BuildMode::Skip)
            .with_file_name("util.h");
        assert_eq!(header.source_file_name(), "util.h");
    }

    #[test]
    fn test_depends_deduplicated() {
        let config =
            BuildConfig::new("main", Language::C, "gcc").with_depends(["util.o", "io.o", "util.o"]);
        assert_eq!(config.depends, vec!["util.o", "io.o"]);
    }

    #[test]
    fn test_fingerprint_covers_source_and_flags() {
        let cc = Path::new("gcc");
        let base = Fingerprint::of_unit(b"int x;", Language::C, cc, &[]);

        assert_eq!(base, Fingerprint::of_unit(b"int x;", Language::C, cc, &[]));
        assert_ne!(base, Fingerprint::of_unit(b"int y;", Language::C, cc, &[]));
        assert_ne!(
            base,
            Fingerprint::of_unit(b"int x;", Language::C, cc, &["-O2".to_string()])
        );
        assert_ne!(
            base,
            Fingerprint::of_unit(b"int x;", Language::C, Path::new("clang"), &[])
        );
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let json = r#"{
            "target_name": "main",
            "language": "c++",
            "compiler_path": "g++",
            "mode": "compile-only"
        }"#;
        let config: BuildConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.language, Language::Cpp);
        assert_eq!(config.mode, BuildMode::CompileOnly);
        assert!(config.depends.is_empty());
        assert!(!config.verbose);
    }

    #[test]
    fn test_command_line_escapes() {
        let step = BuildStep {
            kind: StepKind::Compile,
            target: "main".into(),
            program: PathBuf::from("gcc"),
            args: vec!["-DMSG=hello world".into(), "-c".into(), "main.c".into()],
            cwd: PathBuf::from("."),
            output: PathBuf::from("main.o"),
            fingerprint: Fingerprint(0),
            echo: false,
        };
        assert_eq!(step.command_line(), "gcc '-DMSG=hello world' -c main.c");
    }
}
