//! Thread control block capability
//!
//! The capability names the thread by the physical base of its TCB object.
//! Scheduling state (registers, priority, bound CSpace and VSpace) is kept
//! by the kernel's thread table keyed by that base; see
//! [`ObjectMemory`](crate::memory::ObjectMemory) for the hooks the
//! capability core uses to keep both sides consistent.

use atomik_common::PhysAddr;

use crate::rights::CapRights;

/// TCB capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TcbCap {
    /// Physical base address of the thread state.
    pub base: PhysAddr,
    /// Access rights.
    pub rights: CapRights,
}

impl TcbCap {
    /// Create a TCB capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, rights: CapRights) -> Self {
        Self { base, rights }
    }
}
