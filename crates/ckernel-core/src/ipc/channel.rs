//! Named FIFO used as the "ready for input" doorbell.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;

use super::protocol::count_ready;
use crate::error::{Error, Result};

/// Reader side of one run's input channel.
///
/// The channel exists on disk from [`IpcChannel::create`] until
/// [`IpcChannel::release`] or drop, whichever comes first. A private write
/// end is held open so reads never see end-of-file while the program has not
/// opened (or has closed) its own end.
#[derive(Debug)]
pub struct IpcChannel {
    path: PathBuf,
    receiver: Option<pipe::Receiver>,
    keepalive: Option<pipe::Sender>,
}

impl IpcChannel {
    /// Mint a channel with a fresh unique name inside `dir`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(dir: &Path) -> Result<Self> {
        let name = format!("ckernel-{}.fifo", uuid::Uuid::new_v4());
        Self::create_at(dir.join(name))
    }

    /// Create a channel at an exact path. Fails if the name is taken.
    pub fn create_at(path: PathBuf) -> Result<Self> {
        nix::unistd::mkfifo(path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
            Error::Ipc(format!("failed to create channel {}: {}", path.display(), e))
        })?;

        let opened = pipe::OpenOptions::new()
            .open_receiver(&path)
            .and_then(|receiver| {
                let keepalive = pipe::OpenOptions::new().open_sender(&path)?;
                Ok((receiver, keepalive))
            });

        match opened {
            Ok((receiver, keepalive)) => {
                tracing::debug!("Created input channel {}", path.display());
                Ok(Self {
                    path,
                    receiver: Some(receiver),
                    keepalive: Some(keepalive),
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(Error::Ipc(format!(
                    "failed to open channel {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    /// System-visible name handed to the program.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next chunk of signals and return how many input requests
    /// it carries. Returns `Ok(0)` once released.
    pub async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(0);
        };
        let n = receiver.read(buf).await?;
        Ok(count_ready(&buf[..n]))
    }

    /// Close both ends and remove the name. Idempotent.
    pub fn release(&mut self) {
        self.receiver = None;
        self.keepalive = None;
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Released input channel {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove input channel {}: {}",
                self.path.display(),
                e
            ),
        }
    }

    pub fn is_released(&self) -> bool {
        self.receiver.is_none()
    }

    /// Whether a channel could be created at `path` right now.
    pub fn is_name_available(path: &Path) -> bool {
        fs::symlink_metadata(path).is_err()
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        if !self.is_released() {
            self.release();
        }
    }
}
