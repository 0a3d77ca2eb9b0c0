//! Kernel-wide settings.
//!
//! Defaults for the toolchain and the interactive runtime, read once from the
//! environment when the kernel starts.

use std::path::PathBuf;
use std::time::Duration;

use crate::compile::Language;

/// Environment variable overriding the C compiler.
pub const ENV_CC: &str = "CKERNEL_CC";
/// Environment variable overriding the C++ compiler.
pub const ENV_CXX: &str = "CKERNEL_CXX";
/// Extra C flags for programs that are executed.
pub const ENV_EXE_CFLAGS: &str = "CKERNEL_EXE_CFLAGS";
/// Extra C++ flags for programs that are executed.
pub const ENV_EXE_CXXFLAGS: &str = "CKERNEL_EXE_CXXFLAGS";
/// Extra linker flags for programs that are executed.
pub const ENV_EXE_LDFLAGS: &str = "CKERNEL_EXE_LDFLAGS";
/// Path to the input intercept library.
pub const ENV_SHIM_PATH: &str = "CKERNEL_SHIM_PATH";
/// `0` disables discarding the rest of the line after a formatted scan.
pub const ENV_SCAN_DRAIN: &str = "CKERNEL_SCAN_DRAIN";
/// Grace period in milliseconds between SIGTERM and SIGKILL on cancel.
pub const ENV_KILL_GRACE_MS: &str = "CKERNEL_KILL_GRACE_MS";

/// Settings shared by every cell run in a kernel session.
#[derive(Debug, Clone)]
pub struct KernelSettings {
    /// Default C compiler.
    pub cc: PathBuf,

    /// Default C++ compiler.
    pub cxx: PathBuf,

    /// Flags prepended when compiling C units of executed targets.
    pub exe_cflags: Vec<String>,

    /// Flags prepended when compiling C++ units of executed targets.
    pub exe_cxxflags: Vec<String>,

    /// Flags prepended when linking executed targets.
    pub exe_ldflags: Vec<String>,

    /// Input intercept library preloaded into executed programs.
    /// `None` runs programs without interception.
    pub shim_path: Option<PathBuf>,

    /// Discard the remainder of the input line after formatted scans.
    pub scan_drain: bool,

    /// Time a cancelled program gets to exit after SIGTERM.
    pub kill_grace: Duration,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            cc: PathBuf::from("gcc"),
            cxx: PathBuf::from("g++"),
            exe_cflags: Vec::new(),
            exe_cxxflags: Vec::new(),
            exe_ldflags: Vec::new(),
            shim_path: None,
            scan_drain: true,
            kill_grace: Duration::from_millis(2000),
        }
    }
}

impl KernelSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        let mut settings = Self::from_lookup(|key| std::env::var(key).ok());
        if settings.shim_path.is_none() {
            settings.shim_path = find_shim_library();
        }
        settings
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// Unset variables keep their defaults. The shim is only taken from
    /// [`ENV_SHIM_PATH`] here; [`KernelSettings::from_env`] adds discovery.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(cc) = lookup(ENV_CC).filter(|v| !v.trim().is_empty()) {
            settings.cc = PathBuf::from(cc.trim());
        }
        if let Some(cxx) = lookup(ENV_CXX).filter(|v| !v.trim().is_empty()) {
            settings.cxx = PathBuf::from(cxx.trim());
        }
        if let Some(flags) = lookup(ENV_EXE_CFLAGS) {
            settings.exe_cflags = split_flags(&flags);
        }
        if let Some(flags) = lookup(ENV_EXE_CXXFLAGS) {
            settings.exe_cxxflags = split_flags(&flags);
        }
        if let Some(flags) = lookup(ENV_EXE_LDFLAGS) {
            settings.exe_ldflags = split_flags(&flags);
        }
        if let Some(path) = lookup(ENV_SHIM_PATH).filter(|v| !v.is_empty()) {
            settings.shim_path = Some(PathBuf::from(path));
        }
        if let Some(drain) = lookup(ENV_SCAN_DRAIN) {
            settings.scan_drain = !matches!(drain.trim(), "0" | "false" | "no" | "off");
        }
        if let Some(ms) = lookup(ENV_KILL_GRACE_MS) {
            match ms.trim().parse::<u64>() {
                Ok(ms) => settings.kill_grace = Duration::from_millis(ms),
                Err(_) => tracing::warn!("Ignoring invalid {}={}", ENV_KILL_GRACE_MS, ms),
            }
        }

        settings
    }

    /// Default compiler for a language.
    pub fn compiler_for(&self, language: Language) -> &PathBuf {
        match language {
            Language::C => &self.cc,
            Language::Cpp => &self.cxx,
        }
    }

    /// Extra compile flags for executed targets of a language.
    pub fn exe_compile_flags(&self, language: Language) -> &[String] {
        match language {
            Language::C => &self.exe_cflags,
            Language::Cpp => &self.exe_cxxflags,
        }
    }
}

/// Split a flag string on whitespace.
pub fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_string).collect()
}

/// File name of the input intercept library on this platform.
pub fn shim_file_name() -> String {
    format!("{}ckernel_shim.{}", dylib_prefix(), dylib_extension())
}

/// Locate the input intercept library.
///
/// Looks in the following order:
/// 1. Same directory as the current executable (and its parent, for test
///    binaries under `target/<profile>/deps`)
/// 2. The workspace `target/` directory during development
pub fn find_shim_library() -> Option<PathBuf> {
    let name = shim_file_name();

    if let Ok(exe_path) = std::env::current_exe() {
        for dir in exe_path.ancestors().skip(1).take(2) {
            let candidate = dir.join(&name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        for profile in &["debug", "release"] {
            let path = PathBuf::from(&manifest_dir)
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(&name);
            if path.exists() {
                return Some(path.canonicalize().unwrap_or(path));
            }
        }
    }

    None
}

/// Platform-specific dynamic library extension.
pub fn dylib_extension() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "dylib"
    }
    #[cfg(not(target_os = "macos"))]
    {
        "so"
    }
}

/// Platform-specific dynamic library prefix.
pub fn dylib_prefix() -> &'static str {
    "lib"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = KernelSettings::from_lookup(|_| None);
        assert_eq!(settings.cc, PathBuf::from("gcc"));
        assert_eq!(settings.cxx, PathBuf::from("g++"));
        assert!(settings.scan_drain);
        assert!(settings.shim_path.is_none());
        assert_eq!(settings.kill_grace, Duration::from_millis(2000));
    }

    #[test]
    fn test_overrides() {
        let settings = KernelSettings::from_lookup(lookup_from(&[
            (ENV_CC, "clang"),
            (ENV_CXX, " clang++ "),
            (ENV_EXE_CFLAGS, "-std=c11  -Wall"),
            (ENV_EXE_LDFLAGS, "-lm"),
            (ENV_SCAN_DRAIN, "0"),
            (ENV_KILL_GRACE_MS, "50"),
            (ENV_SHIM_PATH, "/opt/ckernel/libckernel_shim.so"),
        ]));

        assert_eq!(settings.cc, PathBuf::from("clang"));
        assert_eq!(settings.cxx, PathBuf::from("clang++"));
        assert_eq!(settings.exe_cflags, vec!["-std=c11", "-Wall"]);
        assert_eq!(settings.exe_ldflags, vec!["-lm"]);
        assert!(!settings.scan_drain);
        assert_eq!(settings.kill_grace, Duration::from_millis(50));
        assert_eq!(
            settings.shim_path,
            Some(PathBuf::from("/opt/ckernel/libckernel_shim.so"))
        );
    }

    #[test]
    fn test_invalid_grace_keeps_default() {
        let settings = KernelSettings::from_lookup(lookup_from(&[(ENV_KILL_GRACE_MS, "soon")]));
        assert_eq!(settings.kill_grace, Duration::from_millis(2000));
    }

    #[test]
    fn test_compiler_for_language() {
        let settings = KernelSettings::default();
        assert_eq!(settings.compiler_for(Language::C), &PathBuf::from("gcc"));
        assert_eq!(settings.compiler_for(Language::Cpp), &PathBuf::from("g++"));
    }

    #[test]
    fn test_shim_file_name() {
        let name = shim_file_name();
        assert!(name.starts_with("libckernel_shim."));
    }
}
