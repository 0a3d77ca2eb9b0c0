//! Working area management.
//!
//! Every kernel session compiles and runs inside its own working area so
//! artifacts of one session never leak into another.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Directory structure for a kernel session.
///
/// ```text
/// <root>/
/// ├── src/   # Saved cell sources (main.c, util.cpp, ...)
/// ├── obj/   # One object file per compilation unit
/// ├── bin/   # One executable per link target
/// └── ipc/   # Input channel names for running programs
/// ```
#[derive(Debug)]
pub struct WorkArea {
    /// Root of the working area.
    pub root: PathBuf,

    /// Saved cell sources.
    pub src_dir: PathBuf,

    /// Object artifacts.
    pub obj_dir: PathBuf,

    /// Linked executables.
    pub bin_dir: PathBuf,

    /// Input channel names.
    pub ipc_dir: PathBuf,

    /// Keeps a temporary root alive; removed when the area is dropped.
    _temp: Option<TempDir>,
}

impl WorkArea {
    /// Create the directory structure under `root`.
    ///
    /// # Errors
    /// Returns an error if directory creation fails.
    pub fn new(root: &Path) -> Result<Self> {
        Self::build(root.to_path_buf(), None)
    }

    /// Create a working area in a fresh temporary directory.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("ckernel-").tempdir()?;
        Self::build(temp.path().to_path_buf(), Some(temp))
    }

    fn build(root: PathBuf, temp: Option<TempDir>) -> Result<Self> {
        let area = Self {
            src_dir: root.join("src"),
            obj_dir: root.join("obj"),
            bin_dir: root.join("bin"),
            ipc_dir: root.join("ipc"),
            root,
            _temp: temp,
        };
        area.create_dirs()?;
        Ok(area)
    }

    fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.src_dir)?;
        fs::create_dir_all(&self.obj_dir)?;
        fs::create_dir_all(&self.bin_dir)?;
        fs::create_dir_all(&self.ipc_dir)?;
        Ok(())
    }

    /// Whether the area lives in a temporary directory.
    pub fn is_temporary(&self) -> bool {
        self._temp.is_some()
    }

    /// Remove every artifact and recreate the empty structure.
    pub fn clean(&self) -> Result<()> {
        for dir in [&self.src_dir, &self.obj_dir, &self.bin_dir, &self.ipc_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        self.create_dirs()
    }
}
