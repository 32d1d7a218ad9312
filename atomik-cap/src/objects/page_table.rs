//! Page table capability
//!
//! A page table holds 1024 page entries and translates one 4 MiB region
//! once it is installed in a page directory.

use atomik_common::{PhysAddr, VirtAddr};

use crate::rights::CapRights;
use crate::slot::SlotRef;

/// Page table capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTableCap {
    /// Physical base address.
    pub base: PhysAddr,
    /// Access rights.
    pub rights: CapRights,
    /// Page directory slot this table is installed in (null when unmapped).
    pub pd: SlotRef,
    /// Base of the 4 MiB region the table translates.
    pub vaddr: VirtAddr,
}

impl PageTableCap {
    /// Create an unmapped page table capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, rights: CapRights) -> Self {
        Self {
            base,
            rights,
            pd: SlotRef::NULL,
            vaddr: VirtAddr::new(0),
        }
    }

    /// Check whether the table is installed in a directory.
    #[inline]
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        !self.pd.is_null()
    }

    /// Check whether `vaddr` falls in the region this table translates.
    #[inline]
    #[must_use]
    pub const fn covers(&self, vaddr: VirtAddr) -> bool {
        self.is_mapped() && vaddr.table_align_down().as_u64() == self.vaddr.as_u64()
    }
}
