//! Events reported to the front-end.
//!
//! Everything a front-end sees about a cell run flows through a single
//! [`EventSink`]: echoed command lines, compiler diagnostics and program
//! output, prompt state changes, and exactly one terminal status per
//! executed program.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sending half of the front-end event stream.
pub type EventSink = mpsc::UnboundedSender<Event>;

/// Receiving half of the front-end event stream.
pub type EventStream = mpsc::UnboundedReceiver<Event>;

/// Create a connected event sink and stream.
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Whether the running program is entering or leaving an input wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptState {
    /// The program is blocked reading stdin; deliver one line.
    Entering,
    /// The delivered line has been written to the program.
    Leaving,
}

/// Final status of an executed program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    /// Exited with code zero.
    Completed,
    /// Exited non-zero, was killed by a signal, or could not be run.
    Failed {
        exit_code: Option<i32>,
        reason: Option<String>,
    },
    /// Stopped by user request.
    Cancelled,
}

impl TerminalStatus {
    /// Exit code, if the program exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TerminalStatus::Completed => Some(0),
            TerminalStatus::Failed { exit_code, .. } => *exit_code,
            TerminalStatus::Cancelled => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Completed)
    }
}

/// A single front-end event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A command line about to be run by the kernel.
    Command { line: String },

    /// Bytes written by a compiler or by the program.
    Output { stream: StreamKind, bytes: Vec<u8> },

    /// Input wait state change.
    Prompt { state: PromptState },

    /// The program finished. Sent exactly once per execution session.
    Terminal { status: TerminalStatus },
}

impl Event {
    /// Output bytes decoded as text, if this is an output event.
    pub fn text(&self) -> Option<String> {
        match self {
            Event::Output { bytes, .. } => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }
}

/// Send an event, ignoring a front-end that has gone away.
pub(crate) fn emit(sink: &EventSink, event: Event) {
    if sink.send(event).is_err() {
        tracing::trace!("Front-end event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::Prompt {
            state: PromptState::Entering,
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert_eq!(json, r#"{"type":"prompt","state":"entering"}"#);

        let event = Event::Terminal {
            status: TerminalStatus::Failed {
                exit_code: Some(3),
                reason: None,
            },
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let back: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(TerminalStatus::Completed.exit_code(), Some(0));
        assert_eq!(TerminalStatus::Cancelled.exit_code(), None);
        let failed = TerminalStatus::Failed {
            exit_code: Some(2),
            reason: None,
        };
        assert_eq!(failed.exit_code(), Some(2));
        assert!(!failed.is_success());
    }

    #[test]
    fn test_emit_after_close() {
        let (sink, stream) = event_channel();
        drop(stream);
        emit(
            &sink,
            Event::Command {
                line: "cc".into(),
            },
        );
    }
}
