//! Interactive I/O relay.
//!
//! A single loop per running program that multiplexes:
//!
//! ```text
//!              ┌─────────────┐  stdout/stderr   ┌───────────┐
//!              │             │ ───────────────► │           │
//!  program ──► │   relay     │  prompt events   │ front-end │
//!  (shim) ───► │   loop      │ ───────────────► │           │
//!   doorbell   │             │ ◄─────────────── │           │
//!              └─────────────┘   input lines    └───────────┘
//!                     │
//!                     └── cancellation token, child exit
//! ```

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio_util::sync::CancellationToken;

use super::session::ExecutionSession;
use super::state::SessionState;
use super::InputReceiver;
use crate::error::{Error, Result};
use crate::events::{Event, PromptState, StreamKind, TerminalStatus, emit};
use crate::ipc::IpcChannel;
use crate::process;

/// How long output is still read after the program exits. Background
/// processes the program left behind may hold the pipes open forever.
const POST_EXIT_DRAIN: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8192;

impl ExecutionSession {
    pub(super) async fn relay(
        &mut self,
        input: &mut InputReceiver,
        cancel: &CancellationToken,
    ) -> Result<TerminalStatus> {
        let (Some(mut stdout), Some(mut stderr)) = (self.stdout.take(), self.stderr.take()) else {
            return Err(Error::Io(io::Error::other("program output streams not captured")));
        };

        let mut out_buf = [0u8; READ_CHUNK];
        let mut err_buf = [0u8; READ_CHUNK];
        let mut signal_buf = [0u8; 64];
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut input_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Ok(self.cancel_run().await);
                }
                read = stdout.read(&mut out_buf), if stdout_open => match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => self.forward(StreamKind::Stdout, &out_buf[..n]),
                    Err(e) => {
                        tracing::warn!("Error reading program stdout: {}", e);
                        stdout_open = false;
                    }
                },
                read = stderr.read(&mut err_buf), if stderr_open => match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => self.forward(StreamKind::Stderr, &err_buf[..n]),
                    Err(e) => {
                        tracing::warn!("Error reading program stderr: {}", e);
                        stderr_open = false;
                    }
                },
                signals = next_signals(&mut self.channel, &mut signal_buf) => match signals {
                    Ok(requests) => {
                        for _ in 0..requests {
                            self.input_requested()?;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Input channel failed, continuing without prompts: {}", e);
                        self.release_channel();
                    }
                },
                line = input.recv(), if input_open => match line {
                    Some(line) => self.deliver(line).await?,
                    None => {
                        tracing::debug!(session = %self.id, "Front-end input closed");
                        input_open = false;
                        self.stdin = None;
                    }
                },
                status = self.child.wait() => break status?,
            }
        };

        let drain = async {
            loop {
                tokio::select! {
                    read = stdout.read(&mut out_buf), if stdout_open => match read {
                        Ok(n) if n > 0 => self.forward(StreamKind::Stdout, &out_buf[..n]),
                        _ => stdout_open = false,
                    },
                    read = stderr.read(&mut err_buf), if stderr_open => match read {
                        Ok(n) if n > 0 => self.forward(StreamKind::Stderr, &err_buf[..n]),
                        _ => stderr_open = false,
                    },
                    else => break,
                }
            }
        };
        if tokio::time::timeout(POST_EXIT_DRAIN, drain).await.is_err() {
            tracing::debug!(session = %self.id, "Output still open after exit, not waiting further");
        }
        self.flush_output();

        Ok(self.finish(exit_status(exit)))
    }

    /// Forward bytes read from the program, holding back split characters.
    fn forward(&mut self, stream: StreamKind, bytes: &[u8]) {
        let buffer = match stream {
            StreamKind::Stdout => &mut self.stdout_buf,
            StreamKind::Stderr => &mut self.stderr_buf,
        };
        if let Some(chunk) = buffer.push(bytes) {
            emit(
                &self.events,
                Event::Output {
                    stream,
                    bytes: chunk,
                },
            );
        }
    }

    fn flush_output(&mut self) {
        for stream in [StreamKind::Stdout, StreamKind::Stderr] {
            let buffer = match stream {
                StreamKind::Stdout => &mut self.stdout_buf,
                StreamKind::Stderr => &mut self.stderr_buf,
            };
            if let Some(bytes) = buffer.flush() {
                emit(&self.events, Event::Output { stream, bytes });
            }
        }
    }

    /// The program is about to block reading stdin.
    fn input_requested(&mut self) -> Result<()> {
        if self.state == SessionState::Running {
            self.enter_prompt()
        } else {
            self.pending_prompts += 1;
            Ok(())
        }
    }

    fn enter_prompt(&mut self) -> Result<()> {
        self.state.transition(SessionState::WaitingForInput)?;
        emit(
            &self.events,
            Event::Prompt {
                state: PromptState::Entering,
            },
        );
        Ok(())
    }

    /// Write one front-end line to the program's stdin.
    async fn deliver(&mut self, line: String) -> Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => {
                let mut data = line.trim_end_matches(|c: char| c == '\r' || c == '\n').as_bytes().to_vec();
                data.push(b'\n');
                if let Err(e) = write_line(stdin, &data).await {
                    tracing::warn!("Program closed its input: {}", e);
                    self.stdin = None;
                }
            }
            None => tracing::debug!("Dropping input line, program input is closed"),
        }

        if self.state == SessionState::WaitingForInput {
            self.state.transition(SessionState::Running)?;
            emit(
                &self.events,
                Event::Prompt {
                    state: PromptState::Leaving,
                },
            );
            if self.pending_prompts > 0 {
                self.pending_prompts -= 1;
                self.enter_prompt()?;
            }
        }
        Ok(())
    }

    async fn cancel_run(&mut self) -> TerminalStatus {
        tracing::info!(session = %self.id, "Cancelling program");
        process::terminate_group(&mut self.child, self.kill_grace).await;
        self.stdout_buf.discard();
        self.stderr_buf.discard();
        self.finish(TerminalStatus::Cancelled)
    }
}

/// Next chunk of input requests; never resolves without a channel.
async fn next_signals(channel: &mut Option<IpcChannel>, buf: &mut [u8]) -> io::Result<usize> {
    match channel {
        Some(channel) => channel.recv(buf).await,
        None => std::future::pending().await,
    }
}

async fn write_line(stdin: &mut ChildStdin, data: &[u8]) -> io::Result<()> {
    stdin.write_all(data).await?;
    stdin.flush().await
}

fn exit_status(status: ExitStatus) -> TerminalStatus {
    if status.success() {
        TerminalStatus::Completed
    } else if let Some(code) = status.code() {
        TerminalStatus::Failed {
            exit_code: Some(code),
            reason: None,
        }
    } else {
        TerminalStatus::Failed {
            exit_code: None,
            reason: status.signal().map(|sig| format!("terminated by signal {sig}")),
        }
    }
}
