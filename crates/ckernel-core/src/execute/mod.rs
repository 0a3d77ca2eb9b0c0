//! Program execution with interactive input.
//!
//! # Architecture
//!
//! ```text
//! RunSpec (from a BuildPlan)
//!     │
//!     └── ExecutionSession::start
//!             │
//!             ├── IpcChannel::create (ipc/ckernel-<uuid>.fifo)
//!             │
//!             └── spawn program (own process group)
//!                     │   env: CKERNEL_CHANNEL, CKERNEL_SCAN_DRAIN,
//!                     │        LD_PRELOAD=libckernel_shim
//!                     │
//!                     └── ExecutionSession::run → relay loop
//!                             │
//!                             ├── stdout/stderr  → Event::Output
//!                             ├── doorbell byte  → Event::Prompt(Entering)
//!                             ├── front-end line → program stdin, Event::Prompt(Leaving)
//!                             ├── cancellation   → kill group, Event::Terminal(Cancelled)
//!                             └── exit           → drain, Event::Terminal(status)
//! ```
//!
//! The channel is released on every exit path, including drop, so a later
//! run never sees a stale request from an earlier one.

mod output;
mod relay;
mod session;
mod state;

use tokio::sync::mpsc;

pub use output::OutputBuffer;
pub use session::{ExecutionSession, SessionConfig};
pub use state::SessionState;

/// Sending half of the front-end input stream: one line per prompt.
pub type InputSender = mpsc::UnboundedSender<String>;

/// Receiving half of the front-end input stream.
pub type InputReceiver = mpsc::UnboundedReceiver<String>;

/// Create a connected input sender and receiver.
pub fn input_channel() -> (InputSender, InputReceiver) {
    mpsc::unbounded_channel()
}
