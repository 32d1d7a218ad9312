//! Allocator and MMU traits
//!
//! - `PageAllocator`: hands out zeroed, page-aligned table frames
//! - `Mmu`: active translation root and TLB maintenance
//! - `PagingError`: why a table operation failed

use atomik_common::{PhysAddr, VirtAddr};

/// Trait for allocating page tables during boot.
///
/// The returned frame must be page-aligned and already zeroed.
pub trait PageAllocator {
    /// Allocate one page table frame, or `None` when exhausted.
    fn allocate_table(&mut self) -> Option<PhysAddr>;
}

/// Bump allocator over a reserved physical range.
#[derive(Debug, Clone, Copy)]
pub struct BumpTableAllocator {
    next: PhysAddr,
    end: PhysAddr,
}

impl BumpTableAllocator {
    /// Allocate tables from `[start, end)`.
    #[must_use]
    pub const fn new(start: PhysAddr, end: PhysAddr) -> Self {
        Self { next: start, end }
    }

    /// First address not yet handed out.
    #[must_use]
    pub const fn watermark(&self) -> PhysAddr {
        self.next
    }
}

impl PageAllocator for BumpTableAllocator {
    fn allocate_table(&mut self) -> Option<PhysAddr> {
        let frame = self.next;
        let after = frame.offset(atomik_common::PAGE_SIZE as u64);
        if after > self.end {
            return None;
        }
        self.next = after;
        Some(frame)
    }
}

/// MMU control as seen by the VSpace manager.
pub trait Mmu {
    /// Drop any cached translation for `va`.
    fn invalidate_page(&mut self, va: VirtAddr);

    /// Install `root` as the active page directory, or the boot directory
    /// when `None`.
    fn switch_address_space(&mut self, root: Option<PhysAddr>);

    /// Physical address of the active page directory.
    fn current_root(&self) -> PhysAddr;
}

/// Errors that can occur during table operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "paging errors must be handled"]
pub enum PagingError {
    /// Address is not page-aligned
    NotAligned,
    /// The entry already maps a different frame
    AlreadyMapped,
    /// A level of the walk is not present
    NotPresent,
    /// The address lies in the kernel half
    KernelRange,
    /// Failed to allocate a page table
    AllocationFailed,
}

impl core::fmt::Display for PagingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotAligned => write!(f, "address is not page-aligned"),
            Self::AlreadyMapped => write!(f, "entry already maps another frame"),
            Self::NotPresent => write!(f, "translation not present"),
            Self::KernelRange => write!(f, "address lies in the kernel half"),
            Self::AllocationFailed => write!(f, "failed to allocate page table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_allocator_exhausts() {
        let mut alloc = BumpTableAllocator::new(PhysAddr::new(0x1000), PhysAddr::new(0x3000));
        assert_eq!(alloc.allocate_table(), Some(PhysAddr::new(0x1000)));
        assert_eq!(alloc.allocate_table(), Some(PhysAddr::new(0x2000)));
        assert_eq!(alloc.allocate_table(), None);
        assert_eq!(alloc.watermark(), PhysAddr::new(0x3000));
    }
}
