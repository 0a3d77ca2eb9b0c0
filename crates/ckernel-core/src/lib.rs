//! Core engine for the ckernel C/C++ notebook kernel.
//!
//! This crate provides:
//! - Build planning with fingerprint-based staleness and a link dependency graph
//! - Compiler/linker invocation with streamed diagnostics
//! - Execution sessions that relay program output and interactive input
//! - The named-FIFO input channel used by the `ckernel-shim` preload library

pub mod compile;
pub mod error;
pub mod events;
pub mod execute;
pub mod ipc;
pub mod kernel;
pub mod paths;
mod process;
pub mod settings;

pub use compile::{BuildConfig, BuildMode, BuildPlan, BuildPlanner, CompilerDriver, Language};
pub use error::{Error, ErrorKind, Result};
pub use events::{Event, EventSink, EventStream, PromptState, StreamKind, TerminalStatus, event_channel};
pub use execute::{ExecutionSession, InputReceiver, InputSender, SessionConfig, SessionState, input_channel};
pub use ipc::IpcChannel;
pub use kernel::{Cell, CellOutcome, Kernel};
pub use paths::WorkArea;
pub use settings::KernelSettings;
