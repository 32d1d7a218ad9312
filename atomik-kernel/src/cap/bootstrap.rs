//! Boot capabilities
//!
//! Seeds the capability system from the boot memory description.
//!
//! # Bootstrap Sequence
//!
//! 1. Create the one-slot kernel array that holds the root CNode cap
//! 2. Place the root CNode (256 slots, guard `0xA`/4) in the first page
//!    of free memory
//! 3. Carve the rest of free memory into naturally aligned power-of-two
//!    blocks and install each as a root Untyped in consecutive root slots
//!
//! Root capabilities have no parent and therefore can never be deleted.

use atomik_cap::cnode::{ROOT_CNODE_GUARD, ROOT_CNODE_GUARD_BITS, ROOT_CNODE_SIZE_BITS};
use atomik_cap::objects::{CNodeCap, MIN_UNTYPED_SIZE_BITS, UntypedCap};
use atomik_cap::{CSpaceStore, CapError, CapObject, CapResult, CapRights, SlotRef};
use atomik_common::{BootMemory, PAGE_SIZE, PhysAddr};

/// Capabilities created at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootCapabilities {
    /// Kernel slot holding the root CNode capability.
    pub root: SlotRef,
    /// Root Untyped capabilities occupy root slots `0..untyped_count`.
    pub untyped_count: u32,
}

/// Size class of the next boot Untyped: the smallest `i` such that bit
/// `i` of `cursor` is set or `2^(i + 1)` exceeds `remaining`.
pub fn block_size_bits(cursor: u64, remaining: u64) -> u32 {
    let mut bits = 0;
    while bits < u64::BITS - 1 && (cursor >> bits) & 1 == 0 && (1u64 << (bits + 1)) <= remaining {
        bits += 1;
    }
    bits
}

/// Create the root CNode and hand all free memory to it as Untyped.
///
/// # Errors
///
/// `NotEnoughMemory` if free memory cannot hold the root CNode page or
/// the CNode storage cannot hold the root arrays.
pub fn capabilities_init<S: CSpaceStore + ?Sized>(
    cs: &mut S,
    boot: &BootMemory,
) -> CapResult<BootCapabilities> {
    if boot.free_size < PAGE_SIZE as u64 {
        log::error!("boot: {} bytes of free memory, no room for the root cnode", boot.free_size);
        return Err(CapError::NotEnoughMemory);
    }
    let holder = cs.create_cnode(0)?;
    let root = SlotRef::new(holder, 0);

    let storage = cs.create_cnode(ROOT_CNODE_SIZE_BITS)?;
    let mut cnode = CNodeCap::new(boot.free_start, storage, ROOT_CNODE_SIZE_BITS, CapRights::ALL);
    cnode.set_guard(ROOT_CNODE_GUARD, ROOT_CNODE_GUARD_BITS)?;
    cs.slot_mut(root)?.object = CapObject::CNode(cnode);

    let mut cursor = boot.free_start.as_u64() + PAGE_SIZE as u64;
    let end = boot.free_end().as_u64();
    let mut index = 0u32;
    while let Some(remaining) = end.checked_sub(cursor).filter(|&r| r >= 1 << MIN_UNTYPED_SIZE_BITS) {
        if index as usize >= cnode.num_slots() {
            log::warn!("boot: root cnode full, {} KiB left unused", remaining >> 10);
            break;
        }
        let bits = block_size_bits(cursor, remaining);
        let at = cs.cnode_slot(root, index)?;
        cs.slot_mut(at)?.object =
            CapObject::Untyped(UntypedCap::new(PhysAddr::new(cursor), bits, CapRights::ALL));
        log::debug!("boot: untyped {} at {:#x}, 2^{} bytes", index, cursor, bits);
        cursor += 1 << bits;
        index += 1;
    }

    log::info!(
        "boot: root cnode at {}, {} untyped covering {} KiB",
        boot.free_start,
        index,
        (cursor - boot.free_start.as_u64() - PAGE_SIZE as u64) >> 10
    );
    Ok(BootCapabilities {
        root,
        untyped_count: index,
    })
}
