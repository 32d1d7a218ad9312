//! Kernel Log Ring
//!
//! Log records are kept in a lock-free ring so they can be drained after
//! the fact, independently of whether a console is attached.
//!
//! # Design
//!
//! - Lock-free MPMC queue using thingbuf
//! - 128 fixed-size entries of [`LOG_ENTRY_CONTENT_SIZE`] content bytes
//! - Overflow drops the new record and counts it
//! - Records carry a sequence number instead of a timestamp

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;
use thingbuf::StaticThingBuf;

/// Maximum size of a single log entry's content (target + message)
pub const LOG_ENTRY_CONTENT_SIZE: usize = 160;

/// Number of log entry slots in a ring
pub const LOG_BUFFER_SLOTS: usize = 128;

/// A single log record with fixed-size storage
#[derive(Clone)]
pub struct LogEntry {
    /// Sequence number, counted per ring
    pub seq: u32,
    /// Log level
    pub level: log::Level,
    /// Length of the target string
    pub target_len: u8,
    /// Length of the message
    pub message_len: u8,
    /// `[target bytes][message bytes]`
    pub content: [u8; LOG_ENTRY_CONTENT_SIZE],
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            seq: 0,
            level: log::Level::Trace,
            target_len: 0,
            message_len: 0,
            content: [0u8; LOG_ENTRY_CONTENT_SIZE],
        }
    }
}

impl LogEntry {
    /// Create a record, truncating target and message to fit.
    pub fn new(seq: u32, level: log::Level, target: &str, message: &str) -> Self {
        let mut entry = Self {
            seq,
            level,
            ..Self::default()
        };

        let target_len = target.len().min(u8::MAX as usize / 2);
        entry.content[..target_len].copy_from_slice(&target.as_bytes()[..target_len]);
        entry.target_len = target_len as u8;

        let message_len = message
            .len()
            .min(LOG_ENTRY_CONTENT_SIZE - target_len)
            .min(u8::MAX as usize);
        entry.content[target_len..target_len + message_len]
            .copy_from_slice(&message.as_bytes()[..message_len]);
        entry.message_len = message_len as u8;

        entry
    }

    /// Get the target string
    pub fn target(&self) -> &str {
        let len = self.target_len as usize;
        core::str::from_utf8(&self.content[..len]).unwrap_or("<invalid>")
    }

    /// Get the message string.
    ///
    /// A message cut inside a multi-byte character is shortened to the
    /// last whole character.
    pub fn message(&self) -> &str {
        let start = self.target_len as usize;
        let bytes = &self.content[start..start + self.message_len as usize];
        match core::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => core::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or(""),
        }
    }

    /// Bytes [`format_into`](Self::format_into) writes.
    pub fn formatted_len(&self) -> usize {
        level_tag(self.level).len() + 1 + self.target_len as usize + 2 + self.message().len() + 1
    }

    /// Write `"[LEVEL] target: message\n"` into `out`.
    ///
    /// Returns the bytes written, or `None` if `out` is too small.
    pub fn format_into(&self, out: &mut [u8]) -> Option<usize> {
        let needed = self.formatted_len();
        if needed > out.len() {
            return None;
        }
        let mut cursor = 0;
        for part in [
            level_tag(self.level).as_bytes(),
            b" ",
            self.target().as_bytes(),
            b": ",
            self.message().as_bytes(),
            b"\n",
        ] {
            out[cursor..cursor + part.len()].copy_from_slice(part);
            cursor += part.len();
        }
        Some(cursor)
    }
}

/// Fixed-width tag for a level.
pub fn level_tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "[ERROR]",
        log::Level::Warn => "[WARN ]",
        log::Level::Info => "[INFO ]",
        log::Level::Debug => "[DEBUG]",
        log::Level::Trace => "[TRACE]",
    }
}

/// Lock-free ring of log records.
pub struct LogRing {
    entries: StaticThingBuf<LogEntry, LOG_BUFFER_SLOTS>,
    // A popped record that did not fit the last drain.
    held: Mutex<Option<LogEntry>>,
    next_seq: AtomicU32,
    dropped: AtomicU32,
}

impl LogRing {
    /// Create an empty ring.
    pub const fn new() -> Self {
        Self {
            entries: StaticThingBuf::new(),
            held: Mutex::new(None),
            next_seq: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Record a message.
    ///
    /// Returns false if the ring was full and the record was dropped.
    pub fn record(&self, level: log::Level, target: &str, message: &str) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let queued = self.entries.push(LogEntry::new(seq, level, target, message)).is_ok();
        if !queued {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Take the oldest record.
    pub fn pop(&self) -> Option<LogEntry> {
        if let Some(entry) = self.held.lock().take() {
            return Some(entry);
        }
        self.entries.pop()
    }

    /// Number of records waiting.
    pub fn available(&self) -> usize {
        self.entries.len() + usize::from(self.held.lock().is_some())
    }

    /// Records lost to overflow since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Format waiting records into `out`, oldest first.
    ///
    /// Stops at the first record that does not fit; that record stays
    /// queued for the next drain. Returns the number of bytes written.
    pub fn drain(&self, out: &mut [u8]) -> usize {
        let mut written = 0;
        while let Some(entry) = self.pop() {
            match entry.format_into(&mut out[written..]) {
                Some(len) => written += len,
                None => {
                    *self.held.lock() = Some(entry);
                    break;
                }
            }
        }
        written
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

/// The kernel's log ring.
pub static LOG_RING: LogRing = LogRing::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_truncates() {
        let long = [b'x'; 300];
        let message = core::str::from_utf8(&long).unwrap();
        let entry = LogEntry::new(0, log::Level::Info, "atomik_cap::ops", message);
        assert_eq!(entry.target(), "atomik_cap::ops");
        assert_eq!(entry.message().len(), LOG_ENTRY_CONTENT_SIZE - "atomik_cap::ops".len());
    }

    #[test]
    fn test_entry_cut_inside_character() {
        let mut message = [b'a'; LOG_ENTRY_CONTENT_SIZE + 4];
        message[LOG_ENTRY_CONTENT_SIZE - 2..LOG_ENTRY_CONTENT_SIZE + 1].copy_from_slice("€".as_bytes());
        let message = core::str::from_utf8(&message).unwrap();
        let entry = LogEntry::new(0, log::Level::Info, "", message);
        assert_eq!(entry.message().len(), LOG_ENTRY_CONTENT_SIZE - 2);
    }

    #[test]
    fn test_drain_keeps_what_does_not_fit() {
        let ring = LogRing::new();
        assert!(ring.record(log::Level::Info, "boot", "first"));
        assert!(ring.record(log::Level::Warn, "boot", "second"));

        let mut out = [0u8; 24];
        let written = ring.drain(&mut out);
        assert_eq!(&out[..written], b"[INFO ] boot: first\n");
        assert_eq!(ring.available(), 1);

        let mut out = [0u8; 64];
        let written = ring.drain(&mut out);
        assert_eq!(&out[..written], b"[WARN ] boot: second\n");
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_overflow_counts_drops() {
        let ring = LogRing::new();
        for _ in 0..LOG_BUFFER_SLOTS {
            assert!(ring.record(log::Level::Debug, "t", "m"));
        }
        assert!(!ring.record(log::Level::Debug, "t", "m"));
        assert_eq!(ring.dropped(), 1);
        assert_eq!(ring.pop().map(|entry| entry.seq), Some(0));
    }
}
