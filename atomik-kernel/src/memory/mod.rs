//! Physical memory arena
//!
//! All physical memory the kernel touches: boot page tables, the kernel
//! image and free memory. Free memory is where every typed object lives;
//! the low part of it is also reachable from kernel mode through the
//! remap window, which is what lets the kernel initialise CNodes, tables
//! and thread state in place.

pub mod layout;

use atomik_common::{BootMemory, PhysAddr, PhysMemory, SparseMemory, VirtAddr};

pub use layout::MachineConfig;

/// Frame-backed physical memory with a remap window.
pub struct PhysArena {
    boot: BootMemory,
    store: SparseMemory,
}

impl PhysArena {
    /// Create an arena with all memory reading as zero.
    #[must_use]
    pub const fn new(boot: BootMemory) -> Self {
        Self {
            boot,
            store: SparseMemory::new(),
        }
    }

    /// Free-memory description this arena was built with.
    #[inline]
    #[must_use]
    pub const fn boot(&self) -> &BootMemory {
        &self.boot
    }

    /// Check whether `[base, base + size)` is reachable through the window.
    #[inline]
    #[must_use]
    pub const fn is_remappable(&self, base: PhysAddr, size: u64) -> bool {
        self.boot.is_remappable(base, size)
    }

    /// Kernel-virtual alias of a remappable physical address.
    #[inline]
    #[must_use]
    pub const fn phys_to_remap(&self, addr: PhysAddr) -> Option<VirtAddr> {
        self.boot.phys_to_remap(addr)
    }

    /// Physical address behind a remap-window alias.
    #[inline]
    #[must_use]
    pub const fn remap_to_phys(&self, addr: VirtAddr) -> Option<PhysAddr> {
        self.boot.remap_to_phys(addr)
    }

    /// Read through the remap window.
    ///
    /// Returns `None` if any byte falls outside the window.
    pub fn read_remap(&self, va: VirtAddr, buf: &mut [u8]) -> Option<()> {
        let pa = self.remap_to_phys(va)?;
        if !self.is_remappable(pa, buf.len() as u64) {
            return None;
        }
        self.store.read_bytes(pa, buf);
        Some(())
    }

    /// Number of frames that have ever been written and not zeroed since.
    #[must_use]
    pub fn resident_frames(&self) -> usize {
        self.store.resident_frames()
    }
}

impl PhysMemory for PhysArena {
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
        self.store.read_bytes(addr, buf);
    }

    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
        self.store.write_bytes(addr, data);
    }

    fn zero(&mut self, addr: PhysAddr, len: u64) {
        self.store.zero(addr, len);
    }
}
