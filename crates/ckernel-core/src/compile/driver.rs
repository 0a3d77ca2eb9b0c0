//! Runs compiler and linker invocations.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::types::BuildStep;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink, StreamKind, emit};
use crate::process;

/// Executes [`BuildStep`]s as child processes.
///
/// Output of the compiler is forwarded to the front-end while it runs and
/// also collected in full, so a failing step reports every diagnostic no
/// matter how long the output gets.
#[derive(Debug, Clone)]
pub struct CompilerDriver {
    kill_grace: Duration,
}

impl CompilerDriver {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }

    /// Run one step, returning the path of the produced artifact.
    ///
    /// # Errors
    /// - [`Error::ToolLaunch`] if the program cannot be started
    /// - [`Error::Compilation`] if it exits non-zero
    /// - [`Error::Cancelled`] if `cancel` fires first
    pub async fn run(
        &self,
        step: &BuildStep,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let command_line = step.command_line();
        tracing::debug!("Running: {}", command_line);
        if step.echo {
            emit(
                events,
                Event::Command {
                    line: format!("$> {command_line}"),
                },
            );
        }

        let mut command = Command::new(&step.program);
        command
            .args(&step.args)
            .current_dir(&step.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = process::isolate(&mut command)
            .spawn()
            .map_err(|source| Error::ToolLaunch {
                program: step.program.clone(),
                source,
            })?;

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            process::terminate_group(&mut child, self.kill_grace).await;
            return Err(Error::Io(std::io::Error::other(
                "compiler output streams not captured",
            )));
        };

        let mut diagnostics = Vec::new();
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut stdout_closed = false;
        let mut stderr_closed = false;
        let mut exit_status = None;

        loop {
            if exit_status.is_some() && stdout_closed && stderr_closed {
                break;
            }

            tokio::select! {
                read = stdout.read(&mut out_buf), if !stdout_closed => match read {
                    Ok(0) => stdout_closed = true,
                    Ok(n) => {
                        diagnostics.extend_from_slice(&out_buf[..n]);
                        emit(events, Event::Output { stream: StreamKind::Stdout, bytes: out_buf[..n].to_vec() });
                    }
                    Err(e) => {
                        tracing::error!("Error reading compiler stdout: {}", e);
                        stdout_closed = true;
                    }
                },
                read = stderr.read(&mut err_buf), if !stderr_closed => match read {
                    Ok(0) => stderr_closed = true,
                    Ok(n) => {
                        diagnostics.extend_from_slice(&err_buf[..n]);
                        emit(events, Event::Output { stream: StreamKind::Stderr, bytes: err_buf[..n].to_vec() });
                    }
                    Err(e) => {
                        tracing::error!("Error reading compiler stderr: {}", e);
                        stderr_closed = true;
                    }
                },
                status = child.wait(), if exit_status.is_none() => {
                    exit_status = Some(status?);
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Cancelling {} step for '{}'", step_label(step), step.target);
                    process::terminate_group(&mut child, self.kill_grace).await;
                    return Err(Error::Cancelled);
                }
            }
        }

        let status = exit_status.ok_or_else(|| std::io::Error::other("compiler status lost"))?;
        if status.success() {
            Ok(step.output.clone())
        } else {
            Err(Error::Compilation {
                target: step.target.clone(),
                exit_code: status.code().unwrap_or(-1),
                diagnostics: String::from_utf8_lossy(&diagnostics).into_owned(),
            })
        }
    }
}

fn step_label(step: &BuildStep) -> &'static str {
    match step.kind {
        super::StepKind::Compile => "compile",
        super::StepKind::Link => "link",
    }
}
