//! Physical memory access
//!
//! Page constants, alignment helpers and the [`PhysMemory`] trait through
//! which the kernel reads and writes physical memory (page tables, pool
//! metadata, object contents).
//!
//! [`SparseMemory`] backs physical memory with lazily allocated frames so
//! that a large address range costs nothing until it is written. Absent
//! frames read as zero, and zeroing a whole frame simply drops it.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use crate::addr::PhysAddr;

/// log2 of the page size.
pub const PAGE_BITS: u32 = 12;

/// Page size in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

const PAGE_MASK: u64 = (PAGE_SIZE as u64) - 1;

const _: () = assert!(PAGE_SIZE.is_power_of_two());
const _: () = assert!(PAGE_SIZE == 4096, "the i386 profile uses 4 KiB pages");

/// Align `value` up to `align` (must be a power of two).
#[inline]
#[must_use]
pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Align `value` down to `align` (must be a power of two).
#[inline]
#[must_use]
pub const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// Byte- and word-granular access to physical memory.
///
/// Words are little-endian, matching the i386 profile.
pub trait PhysMemory {
    /// Copy `buf.len()` bytes starting at `addr` into `buf`.
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]);

    /// Copy `data` into physical memory starting at `addr`.
    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]);

    /// Zero `len` bytes starting at `addr`.
    fn zero(&mut self, addr: PhysAddr, len: u64);

    /// Read a 32-bit word.
    fn read_u32(&self, addr: PhysAddr) -> u32 {
        let mut raw = [0u8; 4];
        self.read_bytes(addr, &mut raw);
        u32::from_le_bytes(raw)
    }

    /// Write a 32-bit word.
    fn write_u32(&mut self, addr: PhysAddr, value: u32) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// Read one byte.
    fn read_u8(&self, addr: PhysAddr) -> u8 {
        let mut raw = [0u8; 1];
        self.read_bytes(addr, &mut raw);
        raw[0]
    }

    /// Write one byte.
    fn write_u8(&mut self, addr: PhysAddr, value: u8) {
        self.write_bytes(addr, &[value]);
    }
}

type Frame = Box<[u8; PAGE_SIZE]>;

/// Frame-backed sparse physical memory.
#[derive(Default)]
pub struct SparseMemory {
    frames: BTreeMap<u64, Frame>,
}

impl SparseMemory {
    /// Create an empty (all-zero) memory.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames: BTreeMap::new(),
        }
    }

    /// Number of frames holding non-trivial content.
    #[must_use]
    pub fn resident_frames(&self) -> usize {
        self.frames.len()
    }

    fn frame_mut(&mut self, frame: u64) -> &mut Frame {
        self.frames
            .entry(frame)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE]))
    }
}

/// Walk `[addr, addr + len)` in per-frame chunks as `(frame, offset, start, count)`,
/// where `start` is the chunk offset relative to `addr`.
fn chunks(addr: u64, len: u64) -> impl Iterator<Item = (u64, usize, usize, usize)> {
    let mut done = 0u64;
    core::iter::from_fn(move || {
        if done >= len {
            return None;
        }
        let cursor = addr + done;
        let offset = (cursor & PAGE_MASK) as usize;
        let count = ((PAGE_SIZE - offset) as u64).min(len - done) as usize;
        let start = done as usize;
        done += count as u64;
        Some((cursor >> PAGE_BITS, offset, start, count))
    })
}

impl PhysMemory for SparseMemory {
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
        for (frame, offset, start, count) in chunks(addr.as_u64(), buf.len() as u64) {
            let dst = &mut buf[start..start + count];
            match self.frames.get(&frame) {
                Some(page) => dst.copy_from_slice(&page[offset..offset + count]),
                None => dst.fill(0),
            }
        }
    }

    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
        for (frame, offset, start, count) in chunks(addr.as_u64(), data.len() as u64) {
            let page = self.frame_mut(frame);
            page[offset..offset + count].copy_from_slice(&data[start..start + count]);
        }
    }

    fn zero(&mut self, addr: PhysAddr, len: u64) {
        for (frame, offset, _, count) in chunks(addr.as_u64(), len) {
            if count == PAGE_SIZE {
                self.frames.remove(&frame);
            } else if let Some(page) = self.frames.get_mut(&frame) {
                page[offset..offset + count].fill(0);
            }
        }
    }
}
