//! Access to the C library's standard streams and stream buffers.

use std::ffi::c_int;
use std::ptr;

use libc::FILE;

#[allow(non_upper_case_globals)]
unsafe extern "C" {
    #[cfg_attr(target_vendor = "apple", link_name = "__stdinp")]
    static stdin: *mut FILE;
    #[cfg_attr(target_vendor = "apple", link_name = "__stdoutp")]
    static stdout: *mut FILE;
}

/// The C library's `stdin` stream.
pub fn stdin_stream() -> *mut FILE {
    // SAFETY: plain read of a pointer the C library initializes before any
    // constructor runs.
    unsafe { stdin }
}

/// Make `stdout` unbuffered so prompts without a newline reach the relay
/// before the program blocks on input.
pub fn unbuffer_stdout() {
    // SAFETY: setvbuf on stdout before the program has written to it.
    let rc = unsafe { libc::setvbuf(stdout, ptr::null_mut(), libc::_IONBF, 0) };
    if rc != 0 {
        tracing::warn!(
            "Could not make stdout unbuffered: {}",
            std::io::Error::last_os_error()
        );
    }
}

/// Whether `stream` reads file descriptor 0.
pub fn reads_stdin(stream: *mut FILE) -> bool {
    // SAFETY: fileno only inspects a valid stream; null is checked first.
    !stream.is_null() && unsafe { libc::fileno(stream) } == libc::STDIN_FILENO
}

/// Bytes already buffered inside `stream`, if this C library exposes them.
///
/// A read from a stream with buffered bytes returns without touching the
/// descriptor, so it never waits for the user.
pub fn buffered_input(stream: *mut FILE) -> Option<usize> {
    if stream.is_null() {
        return None;
    }
    // SAFETY: stream is a live FILE of this C library.
    unsafe { platform::buffered_input(stream) }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod platform {
    use std::ffi::{c_char, c_int};

    use libc::FILE;

    /// Leading fields of glibc's public `struct _IO_FILE`.
    #[repr(C)]
    struct FilePrefix {
        flags: c_int,
        read_ptr: *mut c_char,
        read_end: *mut c_char,
    }

    /// Reading from the ungetc backup area.
    const IO_IN_BACKUP: c_int = 0x100;

    pub unsafe fn buffered_input(stream: *mut FILE) -> Option<usize> {
        // SAFETY: the layout of these fields is part of glibc's ABI.
        let file = unsafe { &*(stream as *const FilePrefix) };
        if file.flags & IO_IN_BACKUP != 0 {
            return Some(1);
        }
        let pending = (file.read_end as usize).saturating_sub(file.read_ptr as usize);
        Some(pending)
    }
}

#[cfg(all(target_os = "linux", target_env = "musl"))]
mod platform {
    use libc::FILE;

    unsafe extern "C" {
        fn __freadahead(stream: *mut FILE) -> libc::size_t;
    }

    pub unsafe fn buffered_input(stream: *mut FILE) -> Option<usize> {
        // SAFETY: musl's documented stdio extension.
        Some(unsafe { __freadahead(stream) })
    }
}

#[cfg(target_vendor = "apple")]
mod platform {
    use std::ffi::{c_int, c_uchar};

    use libc::FILE;

    /// Leading fields of the BSD `struct __sFILE`.
    #[repr(C)]
    struct FilePrefix {
        p: *mut c_uchar,
        r: c_int,
    }

    pub unsafe fn buffered_input(stream: *mut FILE) -> Option<usize> {
        // SAFETY: the layout of these fields is part of the public header.
        let file = unsafe { &*(stream as *const FilePrefix) };
        Some(usize::try_from(file.r).unwrap_or(0))
    }
}

#[cfg(not(any(
    all(target_os = "linux", any(target_env = "gnu", target_env = "musl")),
    target_vendor = "apple"
)))]
mod platform {
    pub unsafe fn buffered_input(_stream: *mut libc::FILE) -> Option<usize> {
        None
    }
}

/// Restores `errno` when dropped, so signalling never leaks an error code
/// into the program.
pub struct ErrnoGuard(c_int);

impl ErrnoGuard {
    pub fn save() -> Self {
        // SAFETY: errno is thread local.
        Self(unsafe { *errno_location() })
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        // SAFETY: as above.
        unsafe { *errno_location() = self.0 };
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_vendor = "apple", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut c_int {
    unsafe { libc::__error() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_is_fd_zero() {
        assert!(reads_stdin(stdin_stream()));
        assert!(!reads_stdin(ptr::null_mut()));
    }

    #[test]
    fn test_other_streams_are_not_stdin() {
        unsafe {
            let file = libc::tmpfile();
            assert!(!reads_stdin(file));
            libc::fclose(file);
        }
    }

    #[cfg(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple"))]
    #[test]
    fn test_buffered_input_counts_unread_bytes() {
        unsafe {
            let file = libc::tmpfile();
            libc::fputs(c"ab\ncd\n".as_ptr(), file);
            libc::rewind(file);

            // The first read fills the buffer with the whole file.
            assert_eq!(libc::fgetc(file), b'a' as std::ffi::c_int);
            assert_eq!(buffered_input(file), Some(5));

            let mut line = [0 as std::ffi::c_char; 16];
            libc::fgets(line.as_mut_ptr(), 16, file);
            assert_eq!(buffered_input(file), Some(3));
            libc::fclose(file);
        }
    }

    #[test]
    fn test_errno_guard_restores() {
        unsafe {
            *errno_location() = libc::EINTR;
            {
                let _guard = ErrnoGuard::save();
                *errno_location() = libc::EAGAIN;
            }
            assert_eq!(*errno_location(), libc::EINTR);
        }
    }
}
