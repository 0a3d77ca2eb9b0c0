//! The per-process interception decision.
//!
//! Everything the intercepted functions need is decided once, when the
//! library is loaded, and never changes afterwards: whether to signal at
//! all, where to, how formatted scans treat the rest of a line, and which
//! real functions to forward to.

use std::ffi::c_int;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem::ManuallyDrop;
use std::os::fd::FromRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libc::FILE;
use tracing_subscriber::EnvFilter;

use crate::originals::Originals;
use crate::protocol::{self, CHANNEL_ENV, LOG_ENV, READY_BYTE, SCAN_DRAIN_ENV};
use crate::stdio::{self, ErrnoGuard};

static CONTEXT: OnceLock<InterceptionContext> = OnceLock::new();

/// The process-wide context, established on first use.
pub fn get() -> &'static InterceptionContext {
    CONTEXT.get_or_init(InterceptionContext::establish)
}

/// Why a process runs without signalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThrough {
    /// No channel named in the environment.
    NoChannel,
    /// Input comes from a file; nobody is typing.
    StdinIsFile,
    /// The channel could not be opened.
    ChannelUnavailable,
}

pub struct InterceptionContext {
    channel: Option<File>,
    scan_drain: bool,
    originals: Originals,
}

impl InterceptionContext {
    fn establish() -> Self {
        init_logging();
        stdio::unbuffer_stdout();

        let originals = Originals::resolve();
        let scan_drain =
            protocol::scan_drain_enabled(std::env::var(SCAN_DRAIN_ENV).ok().as_deref());
        let channel_path = protocol::channel_path(std::env::var_os(CHANNEL_ENV).as_deref());

        let channel = match connect(stdin_is_regular_file(), channel_path) {
            Ok(channel) => Some(channel),
            Err(reason) => {
                tracing::debug!("Input requests disabled: {:?}", reason);
                None
            }
        };

        Self {
            channel,
            scan_drain,
            originals,
        }
    }

    pub fn originals(&self) -> &Originals {
        &self.originals
    }

    pub fn is_interactive(&self) -> bool {
        self.channel.is_some()
    }

    /// Announce a read from `stream` that is about to wait for the user.
    ///
    /// Silent unless the stream is stdin and its buffer is empty.
    pub fn before_read(&self, stream: *mut FILE) {
        let Some(channel) = &self.channel else {
            return;
        };
        if !stdio::reads_stdin(stream) || stdio::buffered_input(stream).is_some_and(|n| n > 0) {
            return;
        }

        let _errno = ErrnoGuard::save();
        if let Err(e) = (&*channel).write_all(&[READY_BYTE]) {
            tracing::debug!("Input request not delivered: {}", e);
        }
    }

    /// Discard the rest of the current line after a formatted scan of stdin.
    ///
    /// Only what is already buffered is discarded, so this never waits for
    /// another line.
    pub fn after_scan(&self, stream: *mut FILE, result: c_int) {
        if !self.scan_drain
            || !self.is_interactive()
            || result == libc::EOF
            || !stdio::reads_stdin(stream)
        {
            return;
        }
        let Some(fgetc) = self.originals.fgetc else {
            return;
        };

        while stdio::buffered_input(stream) != Some(0) {
            // SAFETY: stream is the live stdin stream.
            let c = unsafe { fgetc(stream) };
            if c == libc::EOF || c == c_int::from(b'\n') {
                break;
            }
        }
    }
}

/// Open the channel unless this process should pass through.
fn connect(stdin_is_file: bool, channel: Option<PathBuf>) -> Result<File, PassThrough> {
    if stdin_is_file {
        return Err(PassThrough::StdinIsFile);
    }
    let path = channel.ok_or(PassThrough::NoChannel)?;
    open_channel(&path).map_err(|e| {
        tracing::warn!(
            "Cannot open input channel {}, prompts disabled: {}",
            path.display(),
            e
        );
        PassThrough::ChannelUnavailable
    })
}

/// Open the writing end without waiting for a reader.
fn open_channel(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

fn stdin_is_regular_file() -> bool {
    // SAFETY: ManuallyDrop keeps descriptor 0 open.
    let stdin = ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDIN_FILENO) });
    stdin.metadata().is_ok_and(|m| m.file_type().is_file())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
