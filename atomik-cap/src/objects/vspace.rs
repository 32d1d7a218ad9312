//! Page directory capability
//!
//! A page directory is the root of a virtual address space. Its upper
//! entries (at and above the kernel base) are copied from the boot
//! directory when the object is created, so every address space sees the
//! kernel.

use atomik_common::PhysAddr;

use crate::rights::CapRights;

/// Page directory capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageDirectoryCap {
    /// Physical base address.
    pub base: PhysAddr,
    /// Access rights.
    pub rights: CapRights,
    /// Thread using this directory as its VSpace root, if any.
    pub tcb: Option<PhysAddr>,
}

impl PageDirectoryCap {
    /// Create an unbound page directory capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, rights: CapRights) -> Self {
        Self {
            base,
            rights,
            tcb: None,
        }
    }
}
