//! Child process helpers shared by the compiler driver and execution
//! sessions.
//!
//! Every child is started as the leader of a new process group so that a
//! cancel reaches anything it spawned in turn (the compiler's `cc1`/`ld`,
//! or a user program's own children).

use std::time::Duration;

use nix::sys::signal::{self as nix_signal, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

/// Configure `command` to start its child in a fresh process group.
pub(crate) fn isolate(command: &mut Command) -> &mut Command {
    command.process_group(0).kill_on_drop(true)
}

/// Terminate a child and its process group, then reap it.
///
/// Sends SIGTERM to the group, waits up to `grace` for the child to exit and
/// follows up with SIGKILL. Returns once the child has been reaped.
pub(crate) async fn terminate_group(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };
    let group = Pid::from_raw(pid as i32);

    if let Err(e) = nix_signal::killpg(group, Signal::SIGTERM) {
        tracing::debug!("SIGTERM to process group {} failed: {}", pid, e);
    }

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        tracing::debug!("Process group {} ignored SIGTERM, killing", pid);
        let _ = nix_signal::killpg(group, Signal::SIGKILL);
        let _ = child.wait().await;
    }

    // Stragglers that outlived the leader.
    let _ = nix_signal::killpg(group, Signal::SIGKILL);
}

/// Kill a child's process group without waiting.
pub(crate) fn kill_group(child: &Child) {
    if let Some(pid) = child.id() {
        let _ = nix_signal::killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[tokio::test]
    async fn test_terminate_group_reaps_child() {
        let mut command = Command::new("sh");
        command
            .args(["-c", "sleep 30 & sleep 30"])
            .stdout(Stdio::null());
        let mut child = isolate(&mut command).spawn().expect("spawn sh");

        terminate_group(&mut child, Duration::from_millis(200)).await;

        assert!(child.id().is_none());
        let status = child.try_wait().expect("try_wait");
        assert!(status.is_some());
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_noop() {
        let mut command = Command::new("true");
        let mut child = isolate(&mut command).spawn().expect("spawn true");
        child.wait().await.expect("wait");

        terminate_group(&mut child, Duration::from_millis(50)).await;
    }
}
