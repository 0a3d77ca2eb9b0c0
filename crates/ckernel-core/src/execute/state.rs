//! Execution session state machine.
//!
//! ```text
//! Starting ──► Running ◄──► WaitingForInput
//!    │            │               │
//!    │            ▼               ▼
//!    └──────► Completed | Failed | Cancelled
//! ```

use std::fmt;

use crate::error::{Error, Result};
use crate::events::TerminalStatus;

/// Lifecycle state of one program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Spawning the program.
    Starting,
    /// Program running, not waiting for input.
    Running,
    /// Program announced a blocking read of stdin.
    WaitingForInput,
    /// Exited with code zero.
    Completed,
    /// Exited non-zero, died from a signal, or could not start.
    Failed {
        exit_code: Option<i32>,
        reason: Option<String>,
    },
    /// Stopped by user request.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed { .. } | SessionState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Starting, Running) => true,
            (Running, WaitingForInput) | (WaitingForInput, Running) => true,
            (Starting | Running | WaitingForInput, Completed | Failed { .. } | Cancelled) => {
                // A program that never started cannot have completed.
                !(matches!(self, Starting) && matches!(next, Completed))
            }
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.can_transition_to(&next) {
            return Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Status reported to the front-end for a terminal state.
    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        match self {
            SessionState::Completed => Some(TerminalStatus::Completed),
            SessionState::Failed { exit_code, reason } => Some(TerminalStatus::Failed {
                exit_code: *exit_code,
                reason: reason.clone(),
            }),
            SessionState::Cancelled => Some(TerminalStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal state matching a status.
    pub fn from_terminal(status: &TerminalStatus) -> Self {
        match status {
            TerminalStatus::Completed => SessionState::Completed,
            TerminalStatus::Failed { exit_code, reason } => SessionState::Failed {
                exit_code: *exit_code,
                reason: reason.clone(),
            },
            TerminalStatus::Cancelled => SessionState::Cancelled,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::WaitingForInput => "waiting-for-input",
            SessionState::Completed => "completed",
            SessionState::Failed { .. } => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> SessionState {
        SessionState::Failed {
            exit_code: Some(1),
            reason: None,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut state = SessionState::Starting;
        state.transition(SessionState::Running).unwrap();
        state.transition(SessionState::WaitingForInput).unwrap();
        state.transition(SessionState::Running).unwrap();
        state.transition(SessionState::Completed).unwrap();
        assert!(state.is_terminal());
        assert_eq!(state.terminal_status(), Some(TerminalStatus::Completed));
    }

    #[test]
    fn test_spawn_failure() {
        let mut state = SessionState::Starting;
        state.transition(failed()).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_cannot_complete_without_running() {
        let mut state = SessionState::Starting;
        assert!(state.transition(SessionState::Completed).is_err());
        assert!(state.transition(SessionState::WaitingForInput).is_err());
        assert_eq!(state, SessionState::Starting);
    }

    #[test]
    fn test_exit_while_waiting() {
        let mut state = SessionState::Running;
        state.transition(SessionState::WaitingForInput).unwrap();
        state.transition(failed()).unwrap();
        assert_eq!(state.terminal_status().and_then(|s| s.exit_code()), Some(1));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [SessionState::Completed, failed(), SessionState::Cancelled] {
            for next in [
                SessionState::Starting,
                SessionState::Running,
                SessionState::WaitingForInput,
                SessionState::Completed,
                SessionState::Cancelled,
            ] {
                let mut state = terminal.clone();
                assert!(state.transition(next).is_err());
            }
        }
    }

    #[test]
    fn test_waiting_twice_is_illegal() {
        let mut state = SessionState::Running;
        state.transition(SessionState::WaitingForInput).unwrap();
        let err = state.transition(SessionState::WaitingForInput).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }
}
