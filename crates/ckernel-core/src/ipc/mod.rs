//! Inter-process signalling between executed programs and the kernel.
//!
//! A running program announces "I am about to block reading stdin" by
//! writing one byte into a named FIFO; the relay reads it and surfaces a
//! prompt to the front-end. The FIFO is only a doorbell. The line itself
//! travels over the program's ordinary stdin pipe.

mod channel;
pub mod protocol;

pub use channel::IpcChannel;
pub use protocol::{CHANNEL_DISABLED, CHANNEL_ENV, READY_BYTE, SCAN_DRAIN_ENV, count_ready};
