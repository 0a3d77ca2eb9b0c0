//! Execution sessions: one running program per cell run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::output::OutputBuffer;
use super::state::SessionState;
use super::InputReceiver;
use crate::compile::RunSpec;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink, PromptState, TerminalStatus, emit};
use crate::ipc::protocol::PRELOAD_ENV;
use crate::ipc::{CHANNEL_DISABLED, CHANNEL_ENV, IpcChannel, SCAN_DRAIN_ENV};
use crate::paths::WorkArea;
use crate::process;
use crate::settings::KernelSettings;

/// How to start a program.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Executable to run.
    pub program: PathBuf,

    /// Program arguments.
    pub args: Vec<String>,

    /// Working directory of the program.
    pub cwd: PathBuf,

    /// Directory the input channel is created in.
    pub channel_dir: PathBuf,

    /// Input intercept library to preload, if any.
    pub shim: Option<PathBuf>,

    /// Ask the intercept library to drain the line after formatted scans.
    pub scan_drain: bool,

    /// Time between SIGTERM and SIGKILL when cancelling.
    pub kill_grace: Duration,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl SessionConfig {
    pub fn new(program: impl Into<PathBuf>, channel_dir: impl Into<PathBuf>) -> Self {
        let channel_dir = channel_dir.into();
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: channel_dir.clone(),
            channel_dir,
            shim: None,
            scan_drain: true,
            kill_grace: Duration::from_millis(2000),
            env: Vec::new(),
        }
    }

    /// Config for running a planned target.
    pub fn for_run(run: &RunSpec, area: &WorkArea, settings: &KernelSettings) -> Self {
        Self {
            program: run.executable.clone(),
            args: run.args.clone(),
            cwd: run.cwd.clone(),
            channel_dir: area.ipc_dir.clone(),
            shim: settings.shim_path.clone(),
            scan_drain: settings.scan_drain,
            kill_grace: settings.kill_grace,
            env: Vec::new(),
        }
    }
}

/// One run of a compiled program.
///
/// Owns the child process, its standard streams and the input channel. A
/// session is never reused: running consumes it, and the terminal status
/// event is sent exactly once, whether the program exits, is cancelled, the
/// relay fails, or the session is dropped mid-run.
pub struct ExecutionSession {
    pub(super) id: Uuid,
    pub(super) state: SessionState,
    pub(super) child: Child,
    pub(super) stdin: Option<ChildStdin>,
    pub(super) stdout: Option<ChildStdout>,
    pub(super) stderr: Option<ChildStderr>,
    pub(super) channel: Option<IpcChannel>,
    pub(super) events: EventSink,
    pub(super) kill_grace: Duration,
    pub(super) stdout_buf: OutputBuffer,
    pub(super) stderr_buf: OutputBuffer,
    /// Input requests received while a prompt was already outstanding.
    pub(super) pending_prompts: usize,
    terminal_sent: bool,
}

impl ExecutionSession {
    /// Create the input channel and spawn the program.
    ///
    /// A channel that cannot be created only disables prompts. A program
    /// that cannot be spawned fails the session: the terminal status is
    /// reported and [`Error::Spawn`] returned.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: SessionConfig, events: EventSink) -> Result<Self> {
        let id = Uuid::new_v4();
        let mut state = SessionState::Starting;

        let channel = match IpcChannel::create(&config.channel_dir) {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::warn!("Interactive input disabled for this run: {}", e);
                None
            }
        };
        let channel_name: OsString = channel
            .as_ref()
            .map(|c| c.path().as_os_str().to_owned())
            .unwrap_or_else(|| CHANNEL_DISABLED.into());

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .current_dir(&config.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env(CHANNEL_ENV, channel_name)
            .env(SCAN_DRAIN_ENV, if config.scan_drain { "1" } else { "0" });
        for (key, value) in &config.env {
            command.env(key, value);
        }
        if let Some(shim) = &config.shim {
            command.env(PRELOAD_ENV, preload_value(shim));
            #[cfg(target_os = "macos")]
            command.env("DYLD_FORCE_FLAT_NAMESPACE", "1");
        }

        let mut child = match process::isolate(&mut command).spawn() {
            Ok(child) => child,
            Err(source) => {
                let reason = format!("failed to start {}: {}", config.program.display(), source);
                state.transition(SessionState::Failed {
                    exit_code: None,
                    reason: Some(reason),
                })?;
                if let Some(status) = state.terminal_status() {
                    emit(&events, Event::Terminal { status });
                }
                drop(channel);
                return Err(Error::Spawn {
                    program: config.program,
                    source,
                });
            }
        };

        state.transition(SessionState::Running)?;
        tracing::info!(
            session = %id,
            pid = ?child.id(),
            "Started {}",
            config.program.display()
        );

        Ok(Self {
            id,
            state,
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            channel,
            events,
            kill_grace: config.kill_grace,
            stdout_buf: OutputBuffer::new(),
            stderr_buf: OutputBuffer::new(),
            pending_prompts: 0,
            terminal_sent: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Process id of the program, while it has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Name of the input channel, if one was created and is still held.
    pub fn channel_path(&self) -> Option<&Path> {
        self.channel.as_ref().map(IpcChannel::path)
    }

    /// Relay I/O until the program exits or `cancel` fires.
    ///
    /// Lines received on `input` are written to the program's stdin; closing
    /// the sending side closes the program's stdin. If the relay itself
    /// fails, the program is killed and reaped and the channel released
    /// before the error is returned.
    pub async fn run(
        mut self,
        input: &mut InputReceiver,
        cancel: &CancellationToken,
    ) -> Result<TerminalStatus> {
        match self.relay(input, cancel).await {
            Ok(status) => Ok(status),
            Err(e) => {
                tracing::error!(session = %self.id, "Relay failed: {}", e);
                process::terminate_group(&mut self.child, self.kill_grace).await;
                self.stdout_buf.discard();
                self.stderr_buf.discard();
                self.finish(TerminalStatus::Failed {
                    exit_code: None,
                    reason: Some(format!("internal relay failure: {e}")),
                });
                Err(e)
            }
        }
    }

    pub(super) fn release_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.release();
        }
    }

    /// Enter a terminal state, release the channel and report the status.
    pub(super) fn finish(&mut self, status: TerminalStatus) -> TerminalStatus {
        self.release_channel();
        self.stdin = None;

        if self.state == SessionState::WaitingForInput {
            // Close the open prompt so the front-end stops waiting for input.
            self.pending_prompts = 0;
            emit(
                &self.events,
                Event::Prompt {
                    state: PromptState::Leaving,
                },
            );
        }

        if !self.state.is_terminal() {
            let next = SessionState::from_terminal(&status);
            if let Err(e) = self.state.transition(next.clone()) {
                tracing::warn!(session = %self.id, "{}", e);
                self.state = next;
            }
        }

        if !self.terminal_sent {
            self.terminal_sent = true;
            tracing::info!(session = %self.id, "Program finished: {:?}", status);
            emit(
                &self.events,
                Event::Terminal {
                    status: status.clone(),
                },
            );
        }
        status
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            process::kill_group(&self.child);
            self.finish(TerminalStatus::Cancelled);
        }
    }
}

/// Prepend the intercept library to any preload list already set.
fn preload_value(shim: &Path) -> OsString {
    let mut value = shim.as_os_str().to_owned();
    if let Some(existing) = std::env::var_os(PRELOAD_ENV).filter(|v| !v.is_empty()) {
        value.push(":");
        value.push(existing);
    }
    value
}
