//! Kernel logging: the `log` backend, the record ring and the console.

pub mod buffer;
mod logger;

pub use buffer::{LOG_RING, LogEntry, LogRing};
pub use logger::{Console, init, putc, set_console};
