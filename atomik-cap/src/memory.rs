//! Object memory interface
//!
//! Typed objects live in physical memory. Creating one zeroes or seeds
//! that memory, and destroying one may have to undo hardware-visible state
//! (a page table entry, a bound thread). [`ObjectMemory`] is the kernel
//! side of those effects.

use atomik_common::{PhysAddr, PhysMemory, VirtAddr};

use crate::slot::SlotRef;

/// Address-space roots bound to a thread.
///
/// Each field names the slot holding the CNode or PageDirectory capability
/// the thread was configured with, or is null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ThreadBinding {
    /// Slot of the CSpace root capability.
    pub cspace: SlotRef,
    /// Slot of the VSpace root capability.
    pub vspace: SlotRef,
}

/// Which root of a thread is being detached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundSpace {
    /// Capability space root (CNode).
    CSpace,
    /// Virtual address space root (PageDirectory).
    VSpace,
}

/// Physical memory plus the kernel hooks typed objects depend on.
pub trait ObjectMemory: PhysMemory {
    /// Check whether `[base, base + size)` lies inside the kernel remap
    /// window.
    fn is_remappable(&self, base: PhysAddr, size: u64) -> bool;

    /// Physical base of the boot page directory whose kernel entries are
    /// copied into every new PageDirectory.
    fn kernel_directory(&self) -> PhysAddr;

    /// Drop any cached translation for `vaddr`.
    fn invalidate_page(&mut self, vaddr: VirtAddr);

    /// A TCB object was created at `tcb`.
    fn create_thread(&mut self, _tcb: PhysAddr) {}

    /// The last capability to the TCB at `tcb` is going away.
    ///
    /// The thread leaves the run queue and its bindings are returned so the
    /// caller can clear the back-pointers in the bound capabilities.
    fn release_thread(&mut self, _tcb: PhysAddr) -> ThreadBinding {
        ThreadBinding::default()
    }

    /// The CNode or PageDirectory bound to the thread at `tcb` is being
    /// deleted.
    fn detach_thread(&mut self, _tcb: PhysAddr, _space: BoundSpace) {}
}
