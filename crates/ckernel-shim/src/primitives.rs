//! The exported stdio input functions.
//!
//! Each one announces a read from stdin on the channel, then forwards to the
//! real function. When a real function is missing a related one is used
//! instead, and as a last resort the call reports end-of-file.
//!
//! Variadic scans are received with a fixed number of pointer arguments and
//! forwarded the same way; stable Rust cannot define C variadic functions.
//! Scans with more than 16 conversions are not supported. The calling
//! convention makes this sound only where variadic and fixed arguments are
//! passed alike, which rules out Apple's arm64 ABI.

use std::ffi::{c_char, c_int, c_void};
use std::ptr;

use libc::{EOF, FILE, size_t, ssize_t};

use crate::context;
use crate::originals::VaList;
use crate::stdio::stdin_stream;

/// One scan destination.
type Arg = *mut c_void;

// =============================================================================
// Character and line reads
// =============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn fgetc(stream: *mut FILE) -> c_int {
    let ctx = context::get();
    ctx.before_read(stream);
    match ctx.originals().fgetc {
        // SAFETY: forwarding the caller's arguments unchanged.
        Some(real) => unsafe { real(stream) },
        None => EOF,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn getc(stream: *mut FILE) -> c_int {
    let ctx = context::get();
    ctx.before_read(stream);
    match ctx.originals().getc.or(ctx.originals().fgetc) {
        // SAFETY: as above.
        Some(real) => unsafe { real(stream) },
        None => EOF,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn getchar() -> c_int {
    let ctx = context::get();
    let stdin = stdin_stream();
    ctx.before_read(stdin);
    let originals = ctx.originals();
    match (originals.getchar, originals.fgetc) {
        // SAFETY: as above.
        (Some(real), _) => unsafe { real() },
        (None, Some(fgetc)) => unsafe { fgetc(stdin) },
        (None, None) => EOF,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn fgets(buf: *mut c_char, size: c_int, stream: *mut FILE) -> *mut c_char {
    let ctx = context::get();
    ctx.before_read(stream);
    match ctx.originals().fgets {
        // SAFETY: as above.
        Some(real) => unsafe { real(buf, size, stream) },
        None => ptr::null_mut(),
    }
}

/// Fortified `fgets`, emitted by glibc headers under `_FORTIFY_SOURCE`.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __fgets_chk(
    buf: *mut c_char,
    buf_size: size_t,
    size: c_int,
    stream: *mut FILE,
) -> *mut c_char {
    let ctx = context::get();
    ctx.before_read(stream);
    let originals = ctx.originals();
    match (originals.fgets_chk, originals.fgets) {
        // SAFETY: as above.
        (Some(real), _) => unsafe { real(buf, buf_size, size, stream) },
        (None, Some(fgets)) => unsafe { fgets(buf, size, stream) },
        (None, None) => ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn gets(buf: *mut c_char) -> *mut c_char {
    let ctx = context::get();
    ctx.before_read(stdin_stream());
    match ctx.originals().gets {
        // SAFETY: as above.
        Some(real) => unsafe { real(buf) },
        None => ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn getline(
    line: *mut *mut c_char,
    capacity: *mut size_t,
    stream: *mut FILE,
) -> ssize_t {
    let ctx = context::get();
    ctx.before_read(stream);
    let originals = ctx.originals();
    match (originals.getline, originals.getdelim) {
        // SAFETY: as above.
        (Some(real), _) => unsafe { real(line, capacity, stream) },
        (None, Some(getdelim)) => unsafe { getdelim(line, capacity, c_int::from(b'\n'), stream) },
        (None, None) => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn getdelim(
    line: *mut *mut c_char,
    capacity: *mut size_t,
    delimiter: c_int,
    stream: *mut FILE,
) -> ssize_t {
    let ctx = context::get();
    ctx.before_read(stream);
    match ctx.originals().getdelim {
        // SAFETY: as above.
        Some(real) => unsafe { real(line, capacity, delimiter, stream) },
        None => -1,
    }
}

// =============================================================================
// Formatted scans taking a va_list
// =============================================================================

macro_rules! vscan_entry {
    ($name:ident, $field:ident) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(format: *const c_char, args: VaList) -> c_int {
            let ctx = context::get();
            let stdin = stdin_stream();
            ctx.before_read(stdin);
            let originals = ctx.originals();
            let result = match (originals.$field, originals.vfscanf) {
                // SAFETY: as above.
                (Some(real), _) => unsafe { real(format, args) },
                (None, Some(vfscanf)) => unsafe { vfscanf(stdin, format, args) },
                (None, None) => EOF,
            };
            ctx.after_scan(stdin, result);
            result
        }
    };
}

macro_rules! vfscan_entry {
    ($name:ident, $field:ident) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(
            stream: *mut FILE,
            format: *const c_char,
            args: VaList,
        ) -> c_int {
            let ctx = context::get();
            ctx.before_read(stream);
            let result = match ctx.originals().$field.or(ctx.originals().vfscanf) {
                // SAFETY: as above.
                Some(real) => unsafe { real(stream, format, args) },
                None => EOF,
            };
            ctx.after_scan(stream, result);
            result
        }
    };
}

vscan_entry!(vscanf, vscanf);
vfscan_entry!(vfscanf, vfscanf);

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod isoc {
    use super::*;

    vscan_entry!(__isoc99_vscanf, isoc99_vscanf);
    vfscan_entry!(__isoc99_vfscanf, isoc99_vfscanf);
    vscan_entry!(__isoc23_vscanf, isoc23_vscanf);
    vfscan_entry!(__isoc23_vfscanf, isoc23_vfscanf);
}

// =============================================================================
// Variadic formatted scans
// =============================================================================

macro_rules! scan_entry {
    ($name:ident, $field:ident, $fallback:ident) => {
        #[unsafe(no_mangle)]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            format: *const c_char,
            a0: Arg, a1: Arg, a2: Arg, a3: Arg,
            a4: Arg, a5: Arg, a6: Arg, a7: Arg,
            a8: Arg, a9: Arg, a10: Arg, a11: Arg,
            a12: Arg, a13: Arg, a14: Arg, a15: Arg,
        ) -> c_int {
            let ctx = context::get();
            let stdin = stdin_stream();
            ctx.before_read(stdin);
            let result = match ctx.originals().$field.or(ctx.originals().$fallback) {
                // SAFETY: the real scan reads only the destinations its
                // format names; the remaining arguments are never touched.
                Some(real) => unsafe {
                    real(
                        format, a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13,
                        a14, a15,
                    )
                },
                None => EOF,
            };
            ctx.after_scan(stdin, result);
            result
        }
    };
}

macro_rules! fscan_entry {
    ($name:ident, $field:ident, $fallback:ident) => {
        #[unsafe(no_mangle)]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            stream: *mut FILE,
            format: *const c_char,
            a0: Arg, a1: Arg, a2: Arg, a3: Arg,
            a4: Arg, a5: Arg, a6: Arg, a7: Arg,
            a8: Arg, a9: Arg, a10: Arg, a11: Arg,
            a12: Arg, a13: Arg, a14: Arg, a15: Arg,
        ) -> c_int {
            let ctx = context::get();
            ctx.before_read(stream);
            let result = match ctx.originals().$field.or(ctx.originals().$fallback) {
                // SAFETY: as above.
                Some(real) => unsafe {
                    real(
                        stream, format, a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11,
                        a12, a13, a14, a15,
                    )
                },
                None => EOF,
            };
            ctx.after_scan(stream, result);
            result
        }
    };
}

#[cfg(not(all(target_vendor = "apple", target_arch = "aarch64")))]
mod variadic {
    use super::*;

    scan_entry!(scanf, scanf, scanf);
    fscan_entry!(fscanf, fscanf, fscanf);

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    mod isoc {
        use super::*;

        scan_entry!(__isoc99_scanf, isoc99_scanf, scanf);
        fscan_entry!(__isoc99_fscanf, isoc99_fscanf, fscanf);
        scan_entry!(__isoc23_scanf, isoc23_scanf, isoc99_scanf);
        fscan_entry!(__isoc23_fscanf, isoc23_fscanf, isoc99_fscanf);
    }
}
