//! Boot Handoff
//!
//! Boot code discovers physical memory and hands the kernel a single
//! description of it: the free range, the kernel remap window that makes
//! the low part of that range addressable from kernel mode, and where the
//! kernel image itself lives.

use crate::addr::{PhysAddr, VirtAddr};
use crate::memory::PAGE_SIZE;

/// Start of the kernel half of every address space.
pub const KERNEL_BASE: u64 = 0xD000_0000;

/// Largest remap window the kernel half can hold.
pub const KERNEL_REMAP_MAX: u64 = 0x2000_0000;

/// Kernel image placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelImage {
    /// Physical load address.
    pub phys: PhysAddr,
    /// Virtual link address.
    pub virt: VirtAddr,
    /// Size in bytes (page multiple).
    pub size: u64,
}

impl KernelImage {
    /// Number of pages spanned by the image.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.size.div_ceil(PAGE_SIZE as u64)
    }
}

/// Free-memory and remap-window tuple supplied at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootMemory {
    /// First byte of free physical memory (page-aligned).
    pub free_start: PhysAddr,
    /// Size of the free range in bytes.
    pub free_size: u64,
    /// Kernel-virtual address at which `free_start` is remapped.
    pub remap_start: VirtAddr,
    /// Size of the remap window in bytes.
    pub remap_size: u64,
}

impl BootMemory {
    /// Build and validate a boot memory description.
    ///
    /// Returns `None` if the free range or window is not page-aligned, if
    /// the window is larger than [`KERNEL_REMAP_MAX`], or if the free range
    /// cannot hold the root CNode page.
    #[must_use]
    pub const fn new(
        free_start: PhysAddr,
        free_size: u64,
        remap_start: VirtAddr,
        remap_size: u64,
    ) -> Option<Self> {
        let page_mask = PAGE_SIZE as u64 - 1;
        if !free_start.is_page_aligned()
            || free_size & page_mask != 0
            || !remap_start.is_page_aligned()
            || remap_size & page_mask != 0
            || remap_size > KERNEL_REMAP_MAX
            || free_size <= PAGE_SIZE as u64
        {
            return None;
        }
        Some(Self {
            free_start,
            free_size,
            remap_start,
            remap_size,
        })
    }

    /// One past the last free byte.
    #[inline]
    #[must_use]
    pub const fn free_end(&self) -> PhysAddr {
        self.free_start.offset(self.free_size)
    }

    /// Bytes of free memory the kernel can reach through the window.
    #[inline]
    #[must_use]
    pub const fn remappable_size(&self) -> u64 {
        if self.remap_size < self.free_size {
            self.remap_size
        } else {
            self.free_size
        }
    }

    /// Check whether `[base, base + size)` lies inside free memory.
    #[inline]
    #[must_use]
    pub const fn contains(&self, base: PhysAddr, size: u64) -> bool {
        match base.checked_offset_from(self.free_start) {
            Some(offset) => offset + size <= self.free_size,
            None => false,
        }
    }

    /// Check whether `[base, base + size)` is reachable through the window.
    #[inline]
    #[must_use]
    pub const fn is_remappable(&self, base: PhysAddr, size: u64) -> bool {
        match base.checked_offset_from(self.free_start) {
            Some(offset) => offset + size <= self.remappable_size(),
            None => false,
        }
    }

    /// Translate a remappable physical address to its kernel-virtual alias.
    #[inline]
    #[must_use]
    pub const fn phys_to_remap(&self, addr: PhysAddr) -> Option<VirtAddr> {
        if !self.is_remappable(addr, 1) {
            return None;
        }
        match addr.checked_offset_from(self.free_start) {
            Some(offset) => Some(self.remap_start.offset(offset)),
            None => None,
        }
    }

    /// Translate a kernel-virtual remap alias back to physical.
    #[inline]
    #[must_use]
    pub const fn remap_to_phys(&self, addr: VirtAddr) -> Option<PhysAddr> {
        match addr.as_u64().checked_sub(self.remap_start.as_u64()) {
            Some(offset) if offset < self.remappable_size() => Some(self.free_start.offset(offset)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> BootMemory {
        BootMemory::new(
            PhysAddr::new(0x0020_0000),
            0x0300_0000,
            VirtAddr::new(0xD040_0000),
            0x0200_0000,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_unaligned() {
        assert!(BootMemory::new(PhysAddr::new(0x1001), 0x10000, VirtAddr::new(0), 0x1000).is_none());
        assert!(BootMemory::new(PhysAddr::new(0x1000), 0x1000, VirtAddr::new(0), 0x1000).is_none());
    }

    #[test]
    fn test_remap_translation() {
        let boot = layout();
        let va = boot.phys_to_remap(PhysAddr::new(0x0020_3000)).unwrap();
        assert_eq!(va, VirtAddr::new(0xD040_3000));
        assert_eq!(boot.remap_to_phys(va), Some(PhysAddr::new(0x0020_3000)));
    }

    #[test]
    fn test_high_memory_not_remappable() {
        let boot = layout();
        assert!(boot.contains(PhysAddr::new(0x0300_0000), 0x1000));
        assert!(!boot.is_remappable(PhysAddr::new(0x0300_0000), 0x1000));
        assert!(boot.phys_to_remap(PhysAddr::new(0x0300_0000)).is_none());
        assert!(boot.is_remappable(PhysAddr::new(0x0100_0000), 0x0100_0000));
    }
}
