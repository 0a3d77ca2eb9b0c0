//! Channel protocol constants.
//!
//! Duplicated from ckernel-core (`ipc::protocol`) so the library stays free
//! of the kernel's dependency tree. Keep both in sync.

use std::ffi::OsStr;
use std::path::PathBuf;

/// Environment variable naming the input channel.
pub const CHANNEL_ENV: &str = "CKERNEL_CHANNEL";

/// Value of [`CHANNEL_ENV`] when no channel exists.
pub const CHANNEL_DISABLED: &str = "NONE";

/// Environment variable selecting the scan drain policy (`1`/`0`).
pub const SCAN_DRAIN_ENV: &str = "CKERNEL_SCAN_DRAIN";

/// Environment variable holding the library's log filter.
pub const LOG_ENV: &str = "CKERNEL_SHIM_LOG";

/// Byte written once per input request.
pub const READY_BYTE: u8 = b'R';

/// Channel path named by the environment, if interception is wanted.
pub fn channel_path(value: Option<&OsStr>) -> Option<PathBuf> {
    value
        .filter(|v| !v.is_empty() && *v != CHANNEL_DISABLED)
        .map(PathBuf::from)
}

/// Whether formatted scans drain the rest of the input line. On unless
/// explicitly disabled.
pub fn scan_drain_enabled(value: Option<&str>) -> bool {
    !matches!(
        value.map(str::trim),
        Some("0" | "false" | "no" | "off")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_path() {
        assert_eq!(channel_path(None), None);
        assert_eq!(channel_path(Some(OsStr::new(""))), None);
        assert_eq!(channel_path(Some(OsStr::new("NONE"))), None);
        assert_eq!(
            channel_path(Some(OsStr::new("/tmp/ipc/ckernel-1.fifo"))),
            Some(PathBuf::from("/tmp/ipc/ckernel-1.fifo"))
        );
    }

    #[test]
    fn test_scan_drain_defaults_on() {
        assert!(scan_drain_enabled(None));
        assert!(scan_drain_enabled(Some("1")));
        assert!(scan_drain_enabled(Some("yes")));
        assert!(!scan_drain_enabled(Some("0")));
        assert!(!scan_drain_enabled(Some(" off ")));
    }
}
