//! Notebook manifests.
//!
//! A manifest lists the cells of a notebook in order:
//!
//! ```json
//! {
//!   "cells": [
//!     { "config": { "target_name": "util", "mode": "compile-only" }, "source": "util.c" },
//!     { "config": { "target_name": "main", "depends": ["util.o"] }, "source": "main.c" }
//!   ]
//! }
//! ```
//!
//! Config fields are those of a build config. The language defaults to the
//! source file's extension, the compiler to the configured one for that
//! language, and the mode to compile-and-run. Source paths are relative to
//! the manifest.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use ckernel_core::{BuildConfig, BuildMode, Cell, KernelSettings, Language};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub cells: Vec<CellEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellEntry {
    pub config: CellConfig,
    pub source: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellConfig {
    pub target_name: String,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub compiler_path: Option<PathBuf>,
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    #[serde(default)]
    pub linker_flags: Vec<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub mode: Option<BuildMode>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid manifest {}", path.display()))
    }

    /// Resolve every entry into a cell, reading its source.
    pub fn cells(&self, base: &Path, settings: &KernelSettings) -> anyhow::Result<Vec<Cell>> {
        let mut cells: Vec<Cell> = Vec::with_capacity(self.cells.len());
        for entry in &self.cells {
            let config = entry.build_config(settings)?;
            if cells.iter().any(|c| c.config.target_name == config.target_name) {
                bail!("duplicate cell '{}' in manifest", config.target_name);
            }
            let path = base.join(&entry.source);
            let source = fs::read_to_string(&path).with_context(|| {
                format!(
                    "failed to read source of cell '{}' from {}",
                    config.target_name,
                    path.display()
                )
            })?;
            cells.push(Cell::new(config, source));
        }
        Ok(cells)
    }
}

impl CellEntry {
    fn build_config(&self, settings: &KernelSettings) -> anyhow::Result<BuildConfig> {
        let c = &self.config;
        let language = match c.language {
            Some(language) => language,
            None => self
                .source
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(Language::from_extension)
                .with_context(|| {
                    format!(
                        "cannot tell the language of cell '{}' from {}; set \"language\"",
                        c.target_name,
                        self.source.display()
                    )
                })?,
        };
        let compiler = c
            .compiler_path
            .clone()
            .unwrap_or_else(|| settings.compiler_for(language).clone());

        let mut config = BuildConfig::new(&c.target_name, language, compiler)
            .with_mode(c.mode.unwrap_or(BuildMode::CompileAndRun))
            .with_compiler_flags(c.compiler_flags.iter().cloned())
            .with_linker_flags(c.linker_flags.iter().cloned())
            .with_depends(c.depends.iter().cloned())
            .with_args(c.args.iter().cloned());
        config.verbose = c.verbose;
        if let Some(file_name) = &c.file_name {
            config = config.with_file_name(file_name);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Manifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_from_settings() {
        let manifest = parse(
            r#"{ "cells": [ { "config": { "target_name": "main" }, "source": "main.cpp" } ] }"#,
        );
        let settings = KernelSettings::default();
        let config = manifest.cells[0].build_config(&settings).unwrap();

        assert_eq!(config.language, Language::Cpp);
        assert_eq!(config.compiler_path, settings.cxx);
        assert_eq!(config.mode, BuildMode::CompileAndRun);
        assert!(config.depends.is_empty());
    }

    #[test]
    fn test_explicit_fields() {
        let manifest = parse(
            r#"{ "cells": [ { "config": {
                "target_name": "util",
                "language": "c",
                "compiler_path": "clang",
                "compiler_flags": ["-O2"],
                "depends": ["a.o", "a.o"],
                "mode": "compile-only",
                "verbose": true
            }, "source": "util.txt" } ] }"#,
        );
        let config = manifest.cells[0]
            .build_config(&KernelSettings::default())
            .unwrap();

        assert_eq!(config.compiler_path, PathBuf::from("clang"));
        assert_eq!(config.compiler_flags, vec!["-O2"]);
        assert_eq!(config.depends, vec!["a.o"]);
        assert_eq!(config.mode, BuildMode::CompileOnly);
        assert!(config.verbose);
    }

    #[test]
    fn test_unknown_extension_needs_language() {
        let manifest = parse(
            r#"{ "cells": [ { "config": { "target_name": "x" }, "source": "x.txt" } ] }"#,
        );
        let err = manifest.cells[0]
            .build_config(&KernelSettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("language"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<Manifest, _> = serde_json::from_str(
            r#"{ "cells": [ { "config": { "target_name": "x", "flags": [] }, "source": "x.c" } ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_cells_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.c"), "int main(void){return 0;}\n").unwrap();
        let manifest = parse(
            r#"{ "cells": [
                { "config": { "target_name": "a" }, "source": "a.c" },
                { "config": { "target_name": "a" }, "source": "a.c" }
            ] }"#,
        );
        let err = manifest
            .cells(dir.path(), &KernelSettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
