//! Page frame capability
//!
//! A page is one 4 KiB frame that can be mapped into a page table. Unlike
//! the other kernel objects, page frames may come from memory outside the
//! kernel remap window since the kernel never touches their contents
//! after creation.

use atomik_common::{PhysAddr, VirtAddr};

use crate::rights::CapRights;
use crate::slot::SlotRef;

/// Page capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCap {
    /// Physical base address.
    pub base: PhysAddr,
    /// Access rights.
    pub rights: CapRights,
    /// Page table slot this page is mapped through (null when unmapped).
    pub pt: SlotRef,
    /// Virtual address of the mapping.
    pub vaddr: VirtAddr,
}

impl PageCap {
    /// Create an unmapped page capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, rights: CapRights) -> Self {
        Self {
            base,
            rights,
            pt: SlotRef::NULL,
            vaddr: VirtAddr::new(0),
        }
    }

    /// Check whether the page is installed in a page table.
    #[inline]
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        !self.pt.is_null()
    }
}
