//! Environment contract between the kernel and the input intercept library.
//!
//! Duplicated in `ckernel-shim`, which is loaded into user programs and
//! must not depend on this crate.

/// Names the input channel of the current run.
pub const CHANNEL_ENV: &str = "CKERNEL_CHANNEL";

/// Value of [`CHANNEL_ENV`] that disables interception.
pub const CHANNEL_DISABLED: &str = "NONE";

/// `1` makes formatted scans on stdin discard the rest of the line.
pub const SCAN_DRAIN_ENV: &str = "CKERNEL_SCAN_DRAIN";

/// Byte written once per intercepted input call.
pub const READY_BYTE: u8 = b'R';

/// Preload variable of the platform's dynamic loader.
#[cfg(target_os = "macos")]
pub const PRELOAD_ENV: &str = "DYLD_INSERT_LIBRARIES";
#[cfg(not(target_os = "macos"))]
pub const PRELOAD_ENV: &str = "LD_PRELOAD";

/// Number of input requests in a chunk read from the channel.
pub fn count_ready(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == READY_BYTE).count()
}
