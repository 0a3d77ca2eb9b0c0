//! Input intercept library for programs run by ckernel.
//!
//! Loaded into every executed program through the dynamic loader's preload
//! mechanism (`LD_PRELOAD`, or `DYLD_INSERT_LIBRARIES` on macOS). It replaces
//! the stdio input functions with versions that first write one byte to the
//! channel named by `CKERNEL_CHANNEL`, so the kernel knows the program is
//! about to wait for the user and can show a prompt.
//!
//! # Architecture
//!
//! ```text
//! program ── fgets/scanf/getchar/... ──► primitives ──► real libc function
//!                                            │
//!                                            ▼
//!                              InterceptionContext (once per process)
//!                                            │
//!                                            └── b'R' ──► channel (FIFO)
//! ```
//!
//! The context is established by a load-time initializer: stdout is made
//! unbuffered, the real functions are looked up with `dlsym(RTLD_NEXT)`, and
//! the process decides whether to signal at all. Input redirected from a
//! regular file, a missing channel, or a channel that cannot be opened all
//! make every function behave exactly like the original.

mod context;
mod originals;
#[cfg(not(test))]
mod primitives;
mod protocol;
mod stdio;

/// Runs when the library is loaded, before `main`.
#[cfg(not(test))]
extern "C" fn establish_on_load() {
    context::get();
}

#[cfg(not(test))]
#[used]
#[cfg_attr(
    any(target_os = "linux", target_os = "android", target_os = "freebsd"),
    unsafe(link_section = ".init_array")
)]
#[cfg_attr(target_vendor = "apple", unsafe(link_section = "__DATA,__mod_init_func"))]
static ESTABLISH_ON_LOAD: extern "C" fn() = establish_on_load;
