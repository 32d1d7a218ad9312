//! CNode storage interface
//!
//! CNode slot arrays are owned by the kernel, not by this crate. Every
//! capability operation reaches slots through [`CSpaceStore`], which hands
//! out slots by [`SlotRef`] and creates or destroys whole slot arrays.
//!
//! # Configuration
//!
//! - **Radix**: The number of slots is 2^radix (radix 1-24)
//! - **Guard**: Up to 31 prefix bits that must match before the index
//! - **Size**: Physical footprint = 16 * 2^radix bytes

use crate::error::{CapError, CapResult};
use crate::objects::{CNodeCap, CapObject};
use crate::slot::{CNodeId, CapSlot, SlotRef};

/// Width of a capability pointer in bits.
pub const CPTR_BITS: u32 = 32;

/// Depth sentinel: resolve as many levels as the guard chain dictates.
pub const FULL_DEPTH: u8 = 0xFF;

/// Minimum CNode radix (2 slots).
pub const MIN_CNODE_RADIX: u32 = 1;

/// Maximum CNode radix (16M slots).
pub const MAX_CNODE_RADIX: u32 = 24;

/// Maximum guard size in bits.
pub const MAX_GUARD_BITS: u32 = 31;

/// Radix of the boot root CNode (one page of slots).
pub const ROOT_CNODE_SIZE_BITS: u32 = 8;

/// Guard value of the boot root CNode.
pub const ROOT_CNODE_GUARD: u32 = 0xA;

/// Guard width of the boot root CNode.
pub const ROOT_CNODE_GUARD_BITS: u32 = 4;

/// Access to capability slots and CNode slot arrays.
///
/// Implemented by the kernel's CNode storage.
pub trait CSpaceStore {
    /// Get a slot.
    ///
    /// # Errors
    ///
    /// `Range` if the slot array does not exist (or was destroyed) or the
    /// index is beyond its end.
    fn slot(&self, at: SlotRef) -> CapResult<&CapSlot>;

    /// Get a mutable slot.
    ///
    /// # Errors
    ///
    /// Same as [`slot`](Self::slot).
    fn slot_mut(&mut self, at: SlotRef) -> CapResult<&mut CapSlot>;

    /// Allocate a zeroed slot array of 2^`size_bits` entries.
    ///
    /// # Errors
    ///
    /// `NotEnoughMemory` if the storage cannot hold another array.
    fn create_cnode(&mut self, size_bits: u32) -> CapResult<CNodeId>;

    /// Release a slot array.
    ///
    /// # Errors
    ///
    /// - `Range` if `id` does not name a live array
    /// - `DeleteFirst` if any slot still holds a capability
    fn destroy_cnode(&mut self, id: CNodeId) -> CapResult<()>;

    /// Number of slots in an array, or `None` if `id` is not live.
    fn cnode_len(&self, id: CNodeId) -> Option<usize>;

    /// Copy of the payload held in a slot.
    ///
    /// # Errors
    ///
    /// Same as [`slot`](Self::slot).
    fn object(&self, at: SlotRef) -> CapResult<CapObject> {
        Ok(self.slot(at)?.object)
    }

    /// Check whether every slot of an array is Null.
    fn is_cnode_empty(&self, id: CNodeId) -> bool {
        let Some(len) = self.cnode_len(id) else {
            return true;
        };
        (0..len as u32).all(|index| {
            self.slot(SlotRef::new(id, index))
                .map(CapSlot::is_null)
                .unwrap_or(true)
        })
    }

    /// Get the CNode payload held in a slot.
    ///
    /// # Errors
    ///
    /// `InvalidCapability` if the slot does not hold a CNode.
    fn cnode_cap(&self, at: SlotRef) -> CapResult<CNodeCap> {
        match self.object(at)? {
            CapObject::CNode(cnode) => Ok(cnode),
            _ => Err(CapError::InvalidCapability),
        }
    }

    /// Reference to slot `index` of the CNode held in `cnode`.
    ///
    /// # Errors
    ///
    /// - `InvalidCapability` if `cnode` does not hold a CNode
    /// - `Range` if `index` is outside the CNode
    fn cnode_slot(&self, cnode: SlotRef, index: u32) -> CapResult<SlotRef> {
        let cap = self.cnode_cap(cnode)?;
        if index as usize >= cap.num_slots() {
            return Err(CapError::Range);
        }
        Ok(SlotRef::new(cap.storage, index))
    }
}
