//! Error types for ckernel-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for ckernel-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ckernel-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A declared object dependency matches no saved cell and no file on disk.
    #[error("target '{target}' depends on '{name}', which is neither a saved cell nor an existing file")]
    UnresolvedDependency { target: String, name: String },

    /// Cyclic dependency detected in the link graph.
    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    /// The compiler named by a build config cannot be found.
    #[error("compiler '{}' for target '{target}' not found", path.display())]
    CompilerNotFound { target: String, path: PathBuf },

    /// A target was planned before its source was saved.
    #[error("target '{0}' has no saved source")]
    UnknownTarget(String),

    /// Inconsistent build configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A compiler or linker process could not be started at all.
    #[error("failed to launch '{}': {source}", program.display())]
    ToolLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Compiler or linker ran and exited non-zero.
    #[error("compilation failed for target '{target}' (exit code {exit_code})")]
    Compilation {
        target: String,
        exit_code: i32,
        diagnostics: String,
    },

    /// The compiled program could not be started.
    #[error("failed to start '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input channel creation or connection failed.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Illegal execution session state change.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Execution was cancelled by user request.
    #[error("cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`Error`], used by front-ends to decide how to
/// present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad compiler path, unresolved dependency or similar; nothing was run.
    Configuration,
    /// A compiler or linker exited non-zero.
    Compile,
    /// The executable could not be started.
    Spawn,
    /// The input channel could not be set up.
    Ipc,
    /// A requested terminal state, not a failure.
    Cancelled,
    /// Failure inside the engine itself.
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnresolvedDependency { .. }
            | Error::CyclicDependency(_)
            | Error::CompilerNotFound { .. }
            | Error::UnknownTarget(_)
            | Error::Configuration(_)
            | Error::ToolLaunch { .. } => ErrorKind::Configuration,
            Error::Compilation { .. } => ErrorKind::Compile,
            Error::Spawn { .. } => ErrorKind::Spawn,
            Error::Ipc(_) => ErrorKind::Ipc,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidTransition { .. } | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Render the error together with a short hint for the user.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::UnresolvedDependency { name, .. } => Some(format!(
                "save the cell that produces '{name}' first, or add its directory with -L"
            )),
            Error::CompilerNotFound { .. } => {
                Some("set CKERNEL_CC / CKERNEL_CXX or fix the cell's compiler".to_string())
            }
            Error::Compilation { diagnostics, .. } if !diagnostics.is_empty() => {
                return format!("{self}\n{diagnostics}");
            }
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = Error::UnresolvedDependency {
            target: "main".into(),
            name: "util.o".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Error::ToolLaunch {
            program: PathBuf::from("/nope/cc"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Error::Compilation {
            target: "main".into(),
            exit_code: 1,
            diagnostics: String::new(),
        };
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_hint_includes_diagnostics() {
        let err = Error::Compilation {
            target: "main".into(),
            exit_code: 1,
            diagnostics: "main.c:1: error: expected ';'".into(),
        };
        let text = err.with_hint();
        assert!(text.contains("exit code 1"));
        assert!(text.contains("expected ';'"));
    }
}
