//! CNode object capability
//!
//! A CNode is a power-of-two array of capability slots. The slot array is
//! owned by the kernel's CNode storage and named by a [`CNodeId`]; the
//! capability also records the physical region the array was carved from
//! so that accounting against the parent Untyped stays exact.
//!
//! # Structure
//!
//! - 2^radix slots (radix 1-24)
//! - Each slot accounts for 2^[`CAPSLOT_SIZE_BITS`] bytes of physical memory
//! - A guard of up to 31 bits precedes the index in a capability pointer

use atomik_common::PhysAddr;

use crate::cnode::{CPTR_BITS, MAX_GUARD_BITS};
use crate::error::{CapError, CapResult};
use crate::objects::CAPSLOT_SIZE_BITS;
use crate::rights::CapRights;
use crate::slot::CNodeId;

/// CNode capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CNodeCap {
    /// Physical base of the region backing the slot array.
    pub base: PhysAddr,
    /// Slot array handle.
    pub storage: CNodeId,
    /// Radix (log2 of slot count).
    pub size_bits: u32,
    /// Guard value.
    pub guard: u32,
    /// Guard width in bits.
    pub guard_bits: u32,
    /// Access rights.
    pub rights: CapRights,
    /// Thread using this CNode as its CSpace root, if any.
    pub tcb: Option<PhysAddr>,
}

impl CNodeCap {
    /// Create an unguarded, unbound CNode capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, storage: CNodeId, size_bits: u32, rights: CapRights) -> Self {
        Self {
            base,
            storage,
            size_bits,
            guard: 0,
            guard_bits: 0,
            rights,
            tcb: None,
        }
    }

    /// Number of slots in this CNode.
    #[inline]
    #[must_use]
    pub const fn num_slots(&self) -> usize {
        1 << self.size_bits
    }

    /// Physical footprint of the slot array in bytes.
    #[inline]
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        1 << (self.size_bits + CAPSLOT_SIZE_BITS)
    }

    /// Bits of a capability pointer consumed at this level.
    #[inline]
    #[must_use]
    pub const fn bits_resolved(&self) -> u32 {
        self.guard_bits + self.size_bits
    }

    /// Install a guard.
    ///
    /// # Errors
    ///
    /// - `InvalidSize` if the guard is wider than [`MAX_GUARD_BITS`] or the
    ///   guard plus index no longer fit a capability pointer
    /// - `InvalidArgument` if `guard` has bits above `guard_bits`
    pub fn set_guard(&mut self, guard: u32, guard_bits: u32) -> CapResult<()> {
        if guard_bits > MAX_GUARD_BITS || guard_bits + self.size_bits > CPTR_BITS {
            return Err(CapError::InvalidSize);
        }
        if guard_bits < u32::BITS && guard >> guard_bits != 0 {
            return Err(CapError::InvalidArgument);
        }
        self.guard = guard;
        self.guard_bits = guard_bits;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cnode_size() {
        let cnode = CNodeCap::new(PhysAddr::new(0x1000), CNodeId::new(1, 0), 8, CapRights::ALL);
        assert_eq!(cnode.num_slots(), 256);
        assert_eq!(cnode.size_bytes(), 4096);
        assert_eq!(cnode.bits_resolved(), 8);
    }

    #[test]
    fn test_set_guard() {
        let mut cnode = CNodeCap::new(PhysAddr::new(0x1000), CNodeId::new(1, 0), 8, CapRights::ALL);
        assert_eq!(cnode.set_guard(0xA, 4), Ok(()));
        assert_eq!(cnode.bits_resolved(), 12);
        assert_eq!(cnode.set_guard(0x1A, 4), Err(CapError::InvalidArgument));
        assert_eq!(cnode.set_guard(0, 25), Err(CapError::InvalidSize));
        assert_eq!(cnode.guard, 0xA);
    }
}
