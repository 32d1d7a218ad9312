//! Physical and Virtual Memory Layout
//!
//! Describes the machine the kernel boots on: where the kernel image sits,
//! where boot page tables go, which physical range is free, and where the
//! kernel remap window aliases that range.
//!
//! ```text
//! physical                         virtual (kernel half)
//! kernel.phys   .. +kernel.size    kernel.virt  (image)
//! tables_start  .. free_start      (boot page directory and tables)
//! free_start    .. +free_size      remap_start .. +remap_size (window)
//! ```
//!
//! The default layout has more free memory than the window covers, so the
//! top of free memory is reachable only through user mappings of pages.

use atomik_common::boot::KERNEL_BASE;
use atomik_common::{BootMemory, KernelImage, PAGE_SIZE, PhysAddr, VirtAddr};
use atomik_common::memory::align_up;

/// Physical load address of the kernel image.
pub const KERNEL_PHYS: u64 = 0x0010_0000;

/// Bytes reserved for the kernel image.
pub const KERNEL_SIZE: u64 = 0x0004_0000;

/// First byte of free physical memory.
pub const FREE_START: u64 = 0x0020_0000;

/// Bytes of free physical memory.
pub const FREE_SIZE: u64 = 48 << 20;

/// Kernel-virtual alias of [`FREE_START`].
pub const REMAP_START: u64 = 0xD040_0000;

/// Bytes covered by the remap window.
pub const REMAP_SIZE: u64 = 32 << 20;

/// Boot-time description of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Kernel image placement.
    pub kernel: KernelImage,
    /// Start of the region that holds the boot page tables. The region
    /// ends at `free_start`.
    pub tables_start: PhysAddr,
    /// First byte of free memory.
    pub free_start: PhysAddr,
    /// Size of free memory.
    pub free_size: u64,
    /// Kernel-virtual alias of `free_start`.
    pub remap_start: VirtAddr,
    /// Size of the remap window.
    pub remap_size: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        let kernel = KernelImage {
            phys: PhysAddr::new(KERNEL_PHYS),
            virt: VirtAddr::new(KERNEL_BASE),
            size: KERNEL_SIZE,
        };
        Self {
            kernel,
            tables_start: PhysAddr::new(align_up(KERNEL_PHYS + KERNEL_SIZE, PAGE_SIZE as u64)),
            free_start: PhysAddr::new(FREE_START),
            free_size: FREE_SIZE,
            remap_start: VirtAddr::new(REMAP_START),
            remap_size: REMAP_SIZE,
        }
    }
}

impl MachineConfig {
    /// Validated free-memory description, or `None` if the layout is
    /// unaligned or the window does not fit the kernel half.
    #[must_use]
    pub fn boot_memory(&self) -> Option<BootMemory> {
        if self.remap_start.as_u64() < KERNEL_BASE {
            return None;
        }
        BootMemory::new(self.free_start, self.free_size, self.remap_start, self.remap_size)
    }

    /// One past the last byte available for boot page tables.
    #[inline]
    #[must_use]
    pub const fn tables_end(&self) -> PhysAddr {
        self.free_start
    }
}
