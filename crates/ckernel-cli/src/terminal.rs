//! Terminal front-end: prints kernel events and feeds typed lines back.

use std::io::{self, BufRead, Write};

use ckernel_core::{Event, EventStream, InputSender, PromptState, StreamKind, TerminalStatus};

use crate::colors;

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Program output verbatim, build commands and statuses decorated.
    Text,
    /// One JSON object per event on stdout.
    Json,
}

/// Print events until the kernel drops its sink.
pub async fn print_events(mut events: EventStream, mode: OutputMode) {
    while let Some(event) = events.recv().await {
        let result = match mode {
            OutputMode::Text => print_text(&event),
            OutputMode::Json => print_json(&event),
        };
        if let Err(e) = result {
            tracing::debug!("Terminal output failed: {}", e);
        }
    }
}

fn print_text(event: &Event) -> io::Result<()> {
    match event {
        Event::Output {
            stream: StreamKind::Stdout,
            bytes,
        } => {
            let mut out = io::stdout().lock();
            out.write_all(bytes)?;
            out.flush()
        }
        Event::Output {
            stream: StreamKind::Stderr,
            bytes,
        } => {
            let mut err = io::stderr().lock();
            err.write_all(bytes)?;
            err.flush()
        }
        Event::Command { line } => {
            let mut err = io::stderr().lock();
            writeln!(err, "{}{}{}", colors::DIM, line, colors::RESET)
        }
        Event::Prompt { state } => {
            match state {
                PromptState::Entering => tracing::debug!("Program waiting for input"),
                PromptState::Leaving => tracing::debug!("Input delivered"),
            }
            Ok(())
        }
        Event::Terminal { status } => {
            let mut err = io::stderr().lock();
            match status {
                TerminalStatus::Completed => Ok(()),
                TerminalStatus::Failed {
                    exit_code: Some(code),
                    ..
                } => writeln!(
                    err,
                    "{}Program exited with code {}{}",
                    colors::RED,
                    code,
                    colors::RESET
                ),
                TerminalStatus::Failed { reason, .. } => writeln!(
                    err,
                    "{}Program failed: {}{}",
                    colors::RED,
                    reason.as_deref().unwrap_or("unknown reason"),
                    colors::RESET
                ),
                TerminalStatus::Cancelled => {
                    writeln!(err, "{}Program cancelled{}", colors::YELLOW, colors::RESET)
                }
            }
        }
    }
}

fn print_json(event: &Event) -> io::Result<()> {
    let line = serde_json::to_string(event).map_err(io::Error::other)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()
}

/// Forward lines typed on the terminal (or piped in) to running programs.
///
/// Runs on a plain thread: a blocking read of stdin must not keep the
/// runtime from shutting down. End of input drops the sender, which closes
/// the program's stdin.
pub fn forward_stdin(input: InputSender) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if input.send(line).is_err() {
                break;
            }
        }
    });
}
