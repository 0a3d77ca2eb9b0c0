//! The real stdio input functions, resolved past this library.

use std::ffi::{CStr, c_char, c_int, c_void};

use libc::{FILE, size_t, ssize_t};

/// A `va_list` as it crosses the C ABI: a pointer on every supported target.
pub type VaList = *mut c_void;

pub type FgetcFn = unsafe extern "C" fn(*mut FILE) -> c_int;
pub type GetcharFn = unsafe extern "C" fn() -> c_int;
pub type FgetsFn = unsafe extern "C" fn(*mut c_char, c_int, *mut FILE) -> *mut c_char;
pub type FgetsChkFn = unsafe extern "C" fn(*mut c_char, size_t, c_int, *mut FILE) -> *mut c_char;
pub type GetsFn = unsafe extern "C" fn(*mut c_char) -> *mut c_char;
pub type GetlineFn = unsafe extern "C" fn(*mut *mut c_char, *mut size_t, *mut FILE) -> ssize_t;
pub type GetdelimFn =
    unsafe extern "C" fn(*mut *mut c_char, *mut size_t, c_int, *mut FILE) -> ssize_t;
pub type ScanfFn = unsafe extern "C" fn(*const c_char, ...) -> c_int;
pub type FscanfFn = unsafe extern "C" fn(*mut FILE, *const c_char, ...) -> c_int;
pub type VscanfFn = unsafe extern "C" fn(*const c_char, VaList) -> c_int;
pub type VfscanfFn = unsafe extern "C" fn(*mut FILE, *const c_char, VaList) -> c_int;

/// Generates [`Originals`] and its resolver.
///
/// Required symbols exist in every C library we run on; a missing one is
/// reported as a warning. Optional ones are libc specific aliases.
macro_rules! originals {
    (
        required { $( $req:ident : $req_ty:ty = $req_sym:literal ),* $(,)? }
        optional { $( $opt:ident : $opt_ty:ty = $opt_sym:literal ),* $(,)? }
    ) => {
        /// Resolved originals. `None` means the symbol was not found.
        #[derive(Clone, Copy, Default)]
        pub struct Originals {
            $( pub $req: Option<$req_ty>, )*
            $( pub $opt: Option<$opt_ty>, )*
        }

        impl Originals {
            /// Look every original up with `dlsym(RTLD_NEXT, ..)`.
            pub fn resolve() -> Self {
                let mut originals = Self::default();
                $(
                    // SAFETY: the symbol is the libc function with this signature.
                    originals.$req = unsafe { lookup::<$req_ty>($req_sym) };
                    if originals.$req.is_none() {
                        tracing::warn!(
                            "Could not resolve {:?}; input through it is not intercepted",
                            $req_sym
                        );
                    }
                )*
                $(
                    // SAFETY: as above.
                    originals.$opt = unsafe { lookup::<$opt_ty>($opt_sym) };
                    if originals.$opt.is_none() {
                        tracing::debug!("{:?} not provided by this C library", $opt_sym);
                    }
                )*
                originals
            }
        }
    };
}

originals! {
    required {
        fgetc: FgetcFn = c"fgetc",
        getc: FgetcFn = c"getc",
        getchar: GetcharFn = c"getchar",
        fgets: FgetsFn = c"fgets",
        getline: GetlineFn = c"getline",
        getdelim: GetdelimFn = c"getdelim",
        scanf: ScanfFn = c"scanf",
        fscanf: FscanfFn = c"fscanf",
        vscanf: VscanfFn = c"vscanf",
        vfscanf: VfscanfFn = c"vfscanf",
    }
    optional {
        gets: GetsFn = c"gets",
        fgets_chk: FgetsChkFn = c"__fgets_chk",
        isoc99_scanf: ScanfFn = c"__isoc99_scanf",
        isoc99_fscanf: FscanfFn = c"__isoc99_fscanf",
        isoc99_vscanf: VscanfFn = c"__isoc99_vscanf",
        isoc99_vfscanf: VfscanfFn = c"__isoc99_vfscanf",
        isoc23_scanf: ScanfFn = c"__isoc23_scanf",
        isoc23_fscanf: FscanfFn = c"__isoc23_fscanf",
        isoc23_vscanf: VscanfFn = c"__isoc23_vscanf",
        isoc23_vfscanf: VfscanfFn = c"__isoc23_vfscanf",
    }
}

/// Resolve the next definition of `symbol` after this library.
///
/// # Safety
/// `F` must be a function pointer type matching the symbol's C signature.
unsafe fn lookup<F: Copy>(symbol: &CStr) -> Option<F> {
    // SAFETY: dlsym only reads the NUL-terminated name.
    let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr()) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: function and data pointers share a representation on every
        // platform with dlsym; the caller guarantees the signature.
        Some(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&ptr) })
    }
}
