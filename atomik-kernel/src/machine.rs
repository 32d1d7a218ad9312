//! The simulated machine
//!
//! Physical memory, the MMU and the thread table, bundled so the
//! capability core can reach all three through one [`ObjectMemory`].

use atomik_cap::{BoundSpace, ObjectMemory, ThreadBinding};
use atomik_common::{KernelImage, PhysAddr, PhysMemory, VirtAddr};
use atomik_paging::{Mmu, PagingError, SoftMmu};

use crate::memory::{MachineConfig, PhysArena};
use crate::task::Threads;
use crate::vspace;

/// Hardware state owned by the kernel.
pub struct Machine {
    /// Physical memory.
    pub arena: PhysArena,
    /// Active translation root and TLB.
    pub mmu: SoftMmu,
    /// Thread table and run queue.
    pub threads: Threads,
    /// Where the kernel image is mapped.
    pub kernel: KernelImage,
}

impl Machine {
    /// Build the boot page tables for `config` and start on them.
    ///
    /// # Errors
    ///
    /// `AllocationFailed` if the table region cannot hold the boot tables,
    /// `NotAligned` if the kernel image or window is unaligned.
    pub fn boot(config: &MachineConfig, arena: PhysArena) -> Result<Self, PagingError> {
        let mut arena = arena;
        let boot = *arena.boot();
        let root = vspace::build_boot_tables(&mut arena, config, &boot)?;
        Ok(Self {
            arena,
            mmu: SoftMmu::new(root),
            threads: Threads::new(),
            kernel: config.kernel,
        })
    }
}

impl PhysMemory for Machine {
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
        self.arena.read_bytes(addr, buf);
    }

    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
        self.arena.write_bytes(addr, data);
    }

    fn zero(&mut self, addr: PhysAddr, len: u64) {
        self.arena.zero(addr, len);
    }
}

impl ObjectMemory for Machine {
    fn is_remappable(&self, base: PhysAddr, size: u64) -> bool {
        self.arena.is_remappable(base, size)
    }

    fn kernel_directory(&self) -> PhysAddr {
        self.mmu.boot_root()
    }

    fn invalidate_page(&mut self, vaddr: VirtAddr) {
        Mmu::invalidate_page(&mut self.mmu, vaddr);
    }

    fn create_thread(&mut self, tcb: PhysAddr) {
        self.threads.create(tcb);
    }

    fn release_thread(&mut self, tcb: PhysAddr) -> ThreadBinding {
        let was_current = self.threads.current() == Some(tcb);
        let binding = self.threads.release(tcb);
        if was_current {
            self.mmu.switch_address_space(None);
        }
        binding
    }

    fn detach_thread(&mut self, tcb: PhysAddr, space: BoundSpace) {
        self.threads.detach(tcb, space);
        if space == BoundSpace::VSpace && self.threads.current() == Some(tcb) {
            self.mmu.switch_address_space(None);
        }
    }
}
