//! i386 page table views
//!
//! A table is identified by the physical address of its frame. Entries are
//! read and written through [`PhysMemory`], never through raw pointers.

use core::ops::Range;

use atomik_common::{PAGE_BITS, PAGE_SIZE, PhysAddr, PhysMemory, VirtAddr};

use super::descriptors::{PageDirectoryEntry, PageEntry, PageTableEntry};
use crate::{DESCRIPTOR_SIZE, ENTRIES_PER_TABLE};

/// Mask for extracting table index from virtual address
const INDEX_MASK: u64 = (ENTRIES_PER_TABLE as u64) - 1;

/// Trait for page table operations
///
/// Implemented by each level's table type to provide level-specific
/// indexing and descriptor access.
pub trait PgTable: Copy {
    /// Shift amount for extracting index from virtual address
    const SHIFT: u32;

    /// Descriptor type for this level
    type Descriptor: PageTableEntry;

    /// Wrap the table frame at `pa`.
    fn from_pa(pa: PhysAddr) -> Self;

    /// Physical address of this table.
    fn to_pa(self) -> PhysAddr;

    /// Calculate table index from virtual address
    #[inline]
    fn index(va: VirtAddr) -> usize {
        ((va.as_u64() >> Self::SHIFT) & INDEX_MASK) as usize
    }

    /// Physical address of entry `index`.
    #[inline]
    fn entry_addr(self, index: usize) -> PhysAddr {
        debug_assert!(index < ENTRIES_PER_TABLE);
        self.to_pa().offset(index as u64 * DESCRIPTOR_SIZE)
    }

    /// Read entry `index`.
    #[inline]
    fn get_at<M: PhysMemory + ?Sized>(self, mem: &M, index: usize) -> Self::Descriptor {
        Self::Descriptor::from_raw(mem.read_u32(self.entry_addr(index)))
    }

    /// Write entry `index`.
    #[inline]
    fn set_at<M: PhysMemory + ?Sized>(self, mem: &mut M, index: usize, desc: Self::Descriptor) {
        mem.write_u32(self.entry_addr(index), desc.as_raw());
    }

    /// Get descriptor at the given virtual address
    #[inline]
    fn get_desc<M: PhysMemory + ?Sized>(self, mem: &M, va: VirtAddr) -> Self::Descriptor {
        self.get_at(mem, Self::index(va))
    }

    /// Set descriptor at the given virtual address
    ///
    /// The caller is responsible for invalidating any cached translation.
    #[inline]
    fn set_desc<M: PhysMemory + ?Sized>(self, mem: &mut M, va: VirtAddr, desc: Self::Descriptor) {
        self.set_at(mem, Self::index(va), desc);
    }

    /// Check whether any entry with an index in `range` is present.
    fn any_present<M: PhysMemory + ?Sized>(self, mem: &M, range: Range<usize>) -> bool {
        range.into_iter().any(|index| self.get_at(mem, index).is_present())
    }

    /// Clear all entries (make invalid)
    fn clear<M: PhysMemory + ?Sized>(self, mem: &mut M) {
        mem.zero(self.to_pa(), PAGE_SIZE as u64);
    }
}

/// Page directory (4 MiB per entry)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PageDirectory(PhysAddr);

impl PgTable for PageDirectory {
    const SHIFT: u32 = 22;
    type Descriptor = PageDirectoryEntry;

    #[inline]
    fn from_pa(pa: PhysAddr) -> Self {
        debug_assert!(pa.is_page_aligned());
        Self(pa)
    }

    #[inline]
    fn to_pa(self) -> PhysAddr {
        self.0
    }
}

impl PageDirectory {
    /// Page table installed for `va`, if the PDE is present.
    #[must_use]
    pub fn next_table<M: PhysMemory + ?Sized>(self, mem: &M, va: VirtAddr) -> Option<PageTable> {
        self.get_desc(mem, va).address().map(PageTable::from_pa)
    }
}

/// Page table (4 KiB per entry)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PageTable(PhysAddr);

impl PgTable for PageTable {
    const SHIFT: u32 = PAGE_BITS;
    type Descriptor = PageEntry;

    #[inline]
    fn from_pa(pa: PhysAddr) -> Self {
        debug_assert!(pa.is_page_aligned());
        Self(pa)
    }

    #[inline]
    fn to_pa(self) -> PhysAddr {
        self.0
    }
}

impl core::fmt::Debug for PageDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PageDirectory({:#x})", self.0)
    }
}

impl core::fmt::Debug for PageTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PageTable({:#x})", self.0)
    }
}
