//! Kernel Logging
//!
//! Provides logging infrastructure using the `log` crate.
//!
//! # Log Output
//!
//! Log records are written to:
//! 1. The lock-free [`LOG_RING`] (drained on demand)
//! 2. The console sink, if the platform registered one
//!
//! `d_putc` writes to the same console, unformatted.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Once;

use crate::logging::buffer::{self, LOG_RING};

/// Byte sink for console output.
pub trait Console: Sync {
    /// Write raw bytes.
    fn write_bytes(&self, bytes: &[u8]);
}

static CONSOLE: Once<&'static dyn Console> = Once::new();

/// Register the console sink. Only the first registration takes effect.
pub fn set_console(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
}

/// Write one byte to the console, if there is one.
pub fn putc(byte: u8) {
    if let Some(console) = CONSOLE.get() {
        console.write_bytes(&[byte]);
    }
}

/// Stack buffer for formatting log messages before they are queued
struct MessageBuffer {
    data: [u8; buffer::LOG_ENTRY_CONTENT_SIZE],
    len: usize,
}

impl MessageBuffer {
    const fn new() -> Self {
        Self {
            data: [0u8; buffer::LOG_ENTRY_CONTENT_SIZE],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        match core::str::from_utf8(&self.data[..self.len]) {
            Ok(text) => text,
            Err(err) => core::str::from_utf8(&self.data[..err.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Write for MessageBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let to_copy = bytes.len().min(self.data.len() - self.len);
        self.data[self.len..self.len + to_copy].copy_from_slice(&bytes[..to_copy]);
        self.len += to_copy;
        Ok(())
    }
}

/// Kernel logger implementation
struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut message = MessageBuffer::new();
        let _ = write!(message, "{}", record.args());
        LOG_RING.record(record.level(), record.target(), message.as_str());

        if let Some(console) = CONSOLE.get() {
            let tag = buffer::level_tag(record.level());
            for part in [tag, " ", record.target(), ": ", message.as_str(), "\n"] {
                console.write_bytes(part.as_bytes());
            }
        }
    }

    fn flush(&self) {}
}

/// Global logger instance
static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger with `level` as the maximum level.
///
/// Later calls only change the level.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_err() {
        log::debug!("logger already installed");
    }
    log::set_max_level(level);
}
