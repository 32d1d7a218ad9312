//! Object pool capability
//!
//! A Pool is a power-of-two region split into 2^k same-typed objects and
//! managed by a binary buddy allocator. Objects are handed out by
//! [`pool_alloc`] and returned one at a time when their capability is
//! deleted.
//!
//! # Metadata
//!
//! The allocator state lives at the start of the pool itself and occupies
//! as many objects as it needs:
//!
//! ```text
//! +0   object count (u32)
//! +4   top order k (u32)
//! +8   free list heads, one u32 per order 0..=k (u32::MAX = empty)
//! ...  bitmap, one bit per node of the complete tree over 2^k objects
//! ```
//!
//! The bitmap uses binary-heap order: the node of order `o` starting at
//! object `i` is bit `2^(k-o) - 1 + (i >> o)`. A set bit means the block
//! is allocated or split; a clear bit under a set parent is a free block.
//!
//! Free blocks are linked through their first eight bytes (next, prev
//! object index), so every pool object must be at least 8 bytes.

use atomik_common::PhysAddr;

use crate::cdt::CdtOps;
use crate::cnode::CSpaceStore;
use crate::error::{CapError, CapResult};
use crate::memory::ObjectMemory;
use crate::objects::{CAPSLOT_SIZE_BITS, CapObject, object_size_bits};
use crate::ops;
use crate::rights::CapRights;
use crate::slot::{ObjectType, SlotRef};

/// Pool capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolCap {
    /// Physical base address (aligned to the pool size).
    pub base: PhysAddr,
    /// Pool size as log2 bytes.
    pub size_bits: u32,
    /// Access rights, inherited by every allocated object.
    pub rights: CapRights,
    /// Type of the pool's objects (Null until retyped).
    pub pool_type: ObjectType,
    /// Size of one object as log2 bytes.
    pub object_size_bits: u32,
    /// Total number of objects, including those holding metadata.
    pub capacity: u32,
    /// Objects currently free.
    pub available: u32,
}

impl PoolCap {
    /// Create an untyped pool capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, size_bits: u32, rights: CapRights) -> Self {
        Self {
            base,
            size_bits,
            rights,
            pool_type: ObjectType::Null,
            object_size_bits: 0,
            capacity: 0,
            available: 0,
        }
    }

    /// Check whether the pool has been retyped.
    #[inline]
    #[must_use]
    pub const fn is_typed(&self) -> bool {
        !self.pool_type.is_null()
    }
}

// -- Buddy allocator

const COUNT_OFFSET: u64 = 0;
const ORDER_OFFSET: u64 = 4;
const HEADS_OFFSET: u64 = 8;
const NO_BLOCK: u32 = u32::MAX;

/// Bytes of metadata for a tree of top order `top`.
const fn metadata_bytes(top: u32) -> u64 {
    let heads = 4 * (top as u64 + 1);
    let bitmap = ((1u64 << (top + 1)) + 7) / 8;
    HEADS_OFFSET + heads + bitmap
}

/// Objects reserved for metadata.
const fn metadata_objects(top: u32, obj_bits: u32) -> u64 {
    metadata_bytes(top).div_ceil(1 << obj_bits)
}

/// View of one pool's allocator state in physical memory.
#[derive(Clone, Copy)]
struct Buddy {
    base: PhysAddr,
    obj_bits: u32,
    top: u32,
}

impl Buddy {
    const fn of(pool: &PoolCap) -> Self {
        Self {
            base: pool.base,
            obj_bits: pool.object_size_bits,
            top: pool.size_bits - pool.object_size_bits,
        }
    }

    const fn object_addr(self, idx: u32) -> PhysAddr {
        self.base.offset((idx as u64) << self.obj_bits)
    }

    const fn head_addr(self, order: u32) -> PhysAddr {
        self.base.offset(HEADS_OFFSET + 4 * order as u64)
    }

    const fn bitmap_addr(self) -> PhysAddr {
        self.base.offset(HEADS_OFFSET + 4 * (self.top as u64 + 1))
    }

    const fn bit_index(self, idx: u32, order: u32) -> u64 {
        (1u64 << (self.top - order)) - 1 + (idx >> order) as u64
    }

    fn read_bit<M: ObjectMemory + ?Sized>(self, mem: &M, idx: u32, order: u32) -> bool {
        let bit = self.bit_index(idx, order);
        let byte = mem.read_u8(self.bitmap_addr().offset(bit / 8));
        byte & (1 << (bit % 8)) != 0
    }

    fn write_bit<M: ObjectMemory + ?Sized>(self, mem: &mut M, idx: u32, order: u32, set: bool) {
        let bit = self.bit_index(idx, order);
        let addr = self.bitmap_addr().offset(bit / 8);
        let byte = mem.read_u8(addr);
        let mask = 1 << (bit % 8);
        mem.write_u8(addr, if set { byte | mask } else { byte & !mask });
    }

    /// Mark every ancestor of the block `(idx, order)` as split.
    fn mark_ancestors<M: ObjectMemory + ?Sized>(self, mem: &mut M, idx: u32, order: u32) {
        for o in order + 1..=self.top {
            self.write_bit(mem, idx, o, true);
        }
    }

    /// Mark every node inside the block `(idx, order)` as allocated.
    fn mark_subtree<M: ObjectMemory + ?Sized>(self, mem: &mut M, idx: u32, order: u32) {
        for o in 0..order {
            for j in 0..1u32 << (order - o) {
                self.write_bit(mem, idx + (j << o), o, true);
            }
        }
    }

    fn head<M: ObjectMemory + ?Sized>(self, mem: &M, order: u32) -> u32 {
        mem.read_u32(self.head_addr(order))
    }

    fn set_next<M: ObjectMemory + ?Sized>(self, mem: &mut M, idx: u32, next: u32) {
        mem.write_u32(self.object_addr(idx), next);
    }

    fn set_prev<M: ObjectMemory + ?Sized>(self, mem: &mut M, idx: u32, prev: u32) {
        mem.write_u32(self.object_addr(idx).offset(4), prev);
    }

    fn push<M: ObjectMemory + ?Sized>(self, mem: &mut M, order: u32, idx: u32) {
        let next = self.head(&*mem, order);
        self.set_next(mem, idx, next);
        self.set_prev(mem, idx, NO_BLOCK);
        if next != NO_BLOCK {
            self.set_prev(mem, next, idx);
        }
        mem.write_u32(self.head_addr(order), idx);
    }

    fn unlink<M: ObjectMemory + ?Sized>(self, mem: &mut M, order: u32, idx: u32) {
        let addr = self.object_addr(idx);
        let next = mem.read_u32(addr);
        let prev = mem.read_u32(addr.offset(4));
        if prev == NO_BLOCK {
            mem.write_u32(self.head_addr(order), next);
        } else {
            self.set_next(mem, prev, next);
        }
        if next != NO_BLOCK {
            self.set_prev(mem, next, prev);
        }
    }

    /// Lay out fresh metadata and seed the free lists.
    ///
    /// Returns the number of objects reserved for metadata.
    fn format<M: ObjectMemory + ?Sized>(self, mem: &mut M) -> u32 {
        let count = 1u32 << self.top;
        let reserved = metadata_objects(self.top, self.obj_bits) as u32;

        mem.zero(self.base, metadata_bytes(self.top));
        mem.write_u32(self.base.offset(COUNT_OFFSET), count);
        mem.write_u32(self.base.offset(ORDER_OFFSET), self.top);
        for order in 0..=self.top {
            mem.write_u32(self.head_addr(order), NO_BLOCK);
        }

        for idx in 0..reserved {
            self.write_bit(mem, idx, 0, true);
            self.mark_ancestors(mem, idx, 0);
        }

        // Largest aligned blocks that fit what is left
        let mut idx = reserved;
        while idx < count {
            let order = idx.trailing_zeros().min((count - idx).ilog2());
            self.mark_ancestors(mem, idx, order);
            self.push(mem, order, idx);
            idx += 1 << order;
        }
        reserved
    }

    /// Take a block of `order`, splitting a larger one if needed.
    fn alloc<M: ObjectMemory + ?Sized>(self, mem: &mut M, order: u32) -> Option<u32> {
        let from = (order..=self.top).find(|&o| self.head(&*mem, o) != NO_BLOCK)?;
        let idx = self.head(&*mem, from);
        self.unlink(mem, from, idx);
        self.write_bit(mem, idx, from, true);

        for o in (order..from).rev() {
            let upper = idx + (1 << o);
            self.write_bit(mem, idx, o, true);
            self.write_bit(mem, upper, o, false);
            self.push(mem, o, upper);
        }
        self.mark_subtree(mem, idx, order);
        Some(idx)
    }

    /// Return the block `(idx, order)` and merge it with free buddies.
    ///
    /// # Panics
    ///
    /// If the block or any ancestor is not marked busy; the allocator
    /// state is corrupt and cannot be repaired.
    fn free<M: ObjectMemory + ?Sized>(self, mem: &mut M, mut idx: u32, mut order: u32) {
        if let Some(broken) = (order..=self.top).find(|&o| !self.read_bit(&*mem, idx, o)) {
            log::error!(
                "pool {}: block {idx}/{order} freed with clear bit at order {broken}",
                self.base
            );
            panic!("buddy allocator state corrupted");
        }

        self.write_bit(mem, idx, order, false);
        while order < self.top {
            let buddy = idx ^ (1 << order);
            if self.read_bit(&*mem, buddy, order) {
                break;
            }
            self.unlink(mem, order, buddy);
            idx &= !(1 << order);
            order += 1;
            self.write_bit(mem, idx, order, false);
        }
        self.push(mem, order, idx);
    }
}

/// Size parameter that [`ops::init`] expects for a pool object.
const fn init_size_bits(ty: ObjectType, obj_bits: u32) -> u32 {
    match ty {
        ObjectType::CNode => obj_bits - CAPSLOT_SIZE_BITS,
        _ => obj_bits,
    }
}

// -- Operations

/// Split the pool in `pool_at` into objects of type `ty`.
///
/// # Parameters
///
/// - `size_bits`: Entry-count log2 for CNode; ignored for fixed-size types
///
/// # Errors
///
/// - `InvalidCapability`: the slot does not hold a Pool
/// - `RevokeFirst`: objects allocated from the pool are still live
/// - `DeleteFirst`: the pool is already typed
/// - `IllegalOperation`: `ty` is Untyped or Pool
/// - `InvalidType` / `InvalidSize`: see [`object_size_bits`], or an
///   object larger than the pool
/// - `PagesOnly`: a kernel-manipulated type outside the remap window
/// - `NotEnoughMemory`: the metadata leaves no object free
pub fn pool_retype<S, M>(cs: &mut S, mem: &mut M, pool_at: SlotRef, ty: ObjectType, size_bits: u32) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::Pool(mut pool) = cs.object(pool_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if cs.slot(pool_at)?.has_children() {
        return Err(CapError::RevokeFirst);
    }
    if pool.is_typed() {
        return Err(CapError::DeleteFirst);
    }
    if matches!(ty, ObjectType::Untyped | ObjectType::Pool) {
        return Err(CapError::IllegalOperation);
    }
    let obj_bits = object_size_bits(ty, size_bits)?;
    if obj_bits > pool.size_bits {
        return Err(CapError::InvalidSize);
    }
    if ty.needs_kernel_mapping() && !mem.is_remappable(pool.base, 1 << pool.size_bits) {
        return Err(CapError::PagesOnly);
    }

    let top = pool.size_bits - obj_bits;
    let count = 1u64 << top;
    if metadata_objects(top, obj_bits) >= count {
        return Err(CapError::NotEnoughMemory);
    }

    pool.pool_type = ty;
    pool.object_size_bits = obj_bits;
    let reserved = Buddy::of(&pool).format(mem);
    pool.capacity = count as u32;
    pool.available = pool.capacity - reserved;
    cs.slot_mut(pool_at)?.object = CapObject::Pool(pool);

    log::debug!(
        "pool {}: {} x {} (2^{}), {} reserved",
        pool.base,
        pool.capacity,
        ty,
        obj_bits,
        reserved
    );
    Ok(())
}

/// Allocate `dest.len()` objects from the pool in `pool_at`.
///
/// The request is served as a run of aligned blocks of decreasing size;
/// objects in one block are contiguous, blocks need not be. A block whose
/// objects fail to initialise is returned to the pool, while blocks
/// already placed stay allocated.
///
/// # Errors
///
/// - `InvalidCapability`: the slot does not hold a Pool
/// - `InvalidArgument`: `dest` is empty
/// - `InitFirst`: the pool has not been retyped
/// - `NotEnoughMemory`: fewer than `dest.len()` objects are free
/// - `DeleteFirst`: a destination slot is occupied
pub fn pool_alloc<S, M>(cs: &mut S, mem: &mut M, pool_at: SlotRef, dest: &[SlotRef]) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::Pool(mut pool) = cs.object(pool_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if dest.is_empty() {
        return Err(CapError::InvalidArgument);
    }
    if !pool.is_typed() {
        return Err(CapError::InitFirst);
    }
    if (pool.available as usize) < dest.len() {
        return Err(CapError::NotEnoughMemory);
    }
    for &at in dest {
        if !cs.slot(at)?.is_null() {
            return Err(CapError::DeleteFirst);
        }
    }

    let buddy = Buddy::of(&pool);
    let ty = pool.pool_type;
    let size_bits = init_size_bits(ty, pool.object_size_bits);
    let mut done = 0;
    let mut order = dest.len().ilog2().min(buddy.top);

    while done < dest.len() {
        let block = 1usize << order;
        if block > dest.len() - done {
            order -= 1;
            continue;
        }
        let Some(idx) = buddy.alloc(mem, order) else {
            if order == 0 {
                log::error!("pool {}: free lists empty with {} available", pool.base, pool.available);
                cs.slot_mut(pool_at)?.object = CapObject::Pool(pool);
                return Err(CapError::NotEnoughMemory);
            }
            order -= 1;
            continue;
        };

        let slots = &dest[done..done + block];
        let mut placed = 0;
        let mut result = Ok(());
        for (j, &at) in slots.iter().enumerate() {
            let base = buddy.object_addr(idx + j as u32);
            result = ops::init(cs, mem, at, ty, size_bits, pool.rights, base).and_then(|()| {
                placed += 1;
                cs.add_child(pool_at, at)
            });
            if result.is_err() {
                break;
            }
        }

        if let Err(err) = result {
            log::debug!("pool {}: rolling back block {idx}/{order}", pool.base);
            for &at in slots[..placed].iter().rev() {
                if let Err(undo) = ops::discard(cs, mem, at) {
                    log::warn!("pool: rollback of {at} failed: {undo}");
                }
            }
            for j in 0..block as u32 {
                buddy.free(mem, idx + j, 0);
            }
            cs.slot_mut(pool_at)?.object = CapObject::Pool(pool);
            return Err(err);
        }

        done += block;
        pool.available -= block as u32;
    }

    cs.slot_mut(pool_at)?.object = CapObject::Pool(pool);
    log::trace!("pool {}: allocated {}, {} left", pool.base, dest.len(), pool.available);
    Ok(())
}

/// Index of the pool object at `base`.
///
/// # Errors
///
/// `InvalidArgument` if `base` is not the start of an allocatable object.
pub fn object_index(pool: &PoolCap, base: PhysAddr) -> CapResult<u32> {
    let offset = base
        .checked_offset_from(pool.base)
        .ok_or(CapError::InvalidArgument)?;
    if offset & ((1 << pool.object_size_bits) - 1) != 0 {
        return Err(CapError::InvalidArgument);
    }
    let idx = offset >> pool.object_size_bits;
    let top = pool.size_bits - pool.object_size_bits;
    if idx >= u64::from(pool.capacity) || idx < metadata_objects(top, pool.object_size_bits) {
        return Err(CapError::InvalidArgument);
    }
    Ok(idx as u32)
}

/// Return the object at `base` to the pool.
///
/// # Errors
///
/// `InvalidArgument`, see [`object_index`].
pub fn free_object<M: ObjectMemory + ?Sized>(mem: &mut M, pool: &mut PoolCap, base: PhysAddr) -> CapResult<()> {
    let idx = object_index(pool, base)?;
    Buddy::of(pool).free(mem, idx, 0);
    pool.available += 1;
    Ok(())
}

/// Delete the object capability in `obj_at`, which must have been
/// allocated from the pool in `pool_at`.
///
/// # Errors
///
/// - `InvalidCapability`: `pool_at` does not hold a Pool
/// - `InvalidArgument`: `obj_at` is not a child of the pool
/// - Any error of [`ops::delete`]
pub fn pool_free<S, M>(cs: &mut S, mem: &mut M, pool_at: SlotRef, obj_at: SlotRef) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::Pool(_) = cs.object(pool_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if cs.links(obj_at)?.parent != pool_at {
        return Err(CapError::InvalidArgument);
    }
    ops::delete(cs, mem, obj_at)
}

/// Delete every object allocated from the pool in `pool_at`, then reset
/// the pool to the untyped state.
///
/// If an object cannot be deleted the pool keeps its type and the objects
/// that remain.
///
/// # Errors
///
/// - `InvalidCapability`: the slot does not hold a Pool
/// - The first error of a nested revoke
pub fn pool_revoke<S, M>(cs: &mut S, mem: &mut M, pool_at: SlotRef) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::Pool(_) = cs.object(pool_at)? else {
        return Err(CapError::InvalidCapability);
    };

    // The pool stays typed until its last object is gone.
    ops::revoke_children(cs, mem, pool_at)?;
    let CapObject::Pool(mut pool) = cs.object(pool_at)? else {
        return Err(CapError::InvalidCapability);
    };
    pool.pool_type = ObjectType::Null;
    pool.object_size_bits = 0;
    pool.capacity = 0;
    pool.available = 0;
    cs.slot_mut(pool_at)?.object = CapObject::Pool(pool);
    log::debug!("pool {}: reset", pool.base);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::untyped::retype;
    use crate::ops::{delete, revoke};
    use crate::slot::CNodeId;
    use crate::testing::{TestMemory, TestStore, root_untyped};
    use alloc::vec::Vec;

    fn pool_cap(store: &TestStore, at: SlotRef) -> PoolCap {
        match store.object(at).unwrap() {
            CapObject::Pool(pool) => pool,
            other => panic!("expected pool, got {other}"),
        }
    }

    /// A Pool of 2^`size_bits` bytes carved from a root untyped, plus a
    /// CNode array of 2^`radix` free slots.
    fn make_pool(base: u64, size_bits: u32, radix: u32) -> (TestStore, TestMemory, SlotRef, CNodeId) {
        let mut store = TestStore::new();
        let mut mem = TestMemory::new();
        let root = store.create_cnode(2).unwrap();
        let ut = root_untyped(&mut store, root, 0, base, size_bits);
        let pool = SlotRef::new(root, 1);
        retype(&mut store, &mut mem, ut, ObjectType::Pool, size_bits, &[pool]).unwrap();
        let slots = store.create_cnode(radix).unwrap();
        (store, mem, pool, slots)
    }

    fn run(slots: CNodeId, start: u32, count: u32) -> Vec<SlotRef> {
        (start..start + count).map(|i| SlotRef::new(slots, i)).collect()
    }

    #[test]
    fn test_metadata_layout() {
        assert_eq!(metadata_bytes(0), 8 + 4 + 1);
        assert_eq!(metadata_bytes(12), 8 + 52 + 1024);
        assert_eq!(metadata_objects(12, 12), 1);
        assert_eq!(metadata_objects(4, 4), 2);
    }

    #[test]
    fn test_retype_checks() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0010_0000, 16, 4);
        let dest = run(slots, 0, 1);

        assert_eq!(pool_alloc(&mut store, &mut mem, pool, &dest), Err(CapError::InitFirst));
        assert_eq!(
            pool_retype(&mut store, &mut mem, pool, ObjectType::Pool, 12),
            Err(CapError::IllegalOperation)
        );
        assert_eq!(
            pool_retype(&mut store, &mut mem, pool, ObjectType::CNode, 14),
            Err(CapError::InvalidSize)
        );
        pool_retype(&mut store, &mut mem, pool, ObjectType::Endpoint, 0).unwrap();
        assert_eq!(
            pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 0),
            Err(CapError::DeleteFirst)
        );

        let cap = pool_cap(&store, pool);
        assert_eq!(cap.capacity, 4096);
        assert_eq!(cap.available, 4096 - metadata_objects(12, 4) as u32);
    }

    #[test]
    fn test_metadata_must_leave_room() {
        let (mut store, mut mem, pool, _) = make_pool(0x0010_0000, 12, 1);
        assert_eq!(
            pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 12),
            Err(CapError::NotEnoughMemory)
        );
        assert!(!pool_cap(&store, pool).is_typed());
    }

    #[test]
    fn test_pages_only_outside_window() {
        let (mut store, mut mem, pool, _) = make_pool(0x0200_0000, 16, 1);
        assert_eq!(
            pool_retype(&mut store, &mut mem, pool, ObjectType::PageTable, 0),
            Err(CapError::PagesOnly)
        );
        pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 0).unwrap();
    }

    #[test]
    fn test_alloc_free_reuses_base() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0100_0000, 20, 4);
        pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 0).unwrap();
        let before = pool_cap(&store, pool).available;

        let dest = run(slots, 0, 1);
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();
        let base = store.object(dest[0]).unwrap().base();
        assert_eq!(pool_cap(&store, pool).available, before - 1);

        delete(&mut store, &mut mem, dest[0]).unwrap();
        assert_eq!(pool_cap(&store, pool).available, before);
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();
        assert_eq!(store.object(dest[0]).unwrap().base(), base);
    }

    #[test]
    fn test_alloc_run_of_blocks() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0100_0000, 20, 4);
        pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 0).unwrap();

        let dest = run(slots, 0, 7);
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();
        assert_eq!(store.child_count(pool).unwrap(), 7);
        assert!(store.children_consistent(pool).unwrap());

        let mut bases: Vec<u64> = dest
            .iter()
            .map(|&at| store.object(at).unwrap().base().as_u64())
            .collect();
        bases.sort_unstable();
        bases.dedup();
        assert_eq!(bases.len(), 7);
        assert!(bases.iter().all(|&b| b % 0x1000 == 0 && b > 0x0100_0000));
    }

    #[test]
    fn test_free_coalesces_everything() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0010_0000, 16, 5);
        pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 0).unwrap();
        let cap = pool_cap(&store, pool);
        assert_eq!(cap.available, 15);

        let dest = run(slots, 0, 15);
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();
        assert_eq!(pool_cap(&store, pool).available, 0);
        assert_eq!(
            pool_alloc(&mut store, &mut mem, pool, &run(slots, 15, 1)),
            Err(CapError::NotEnoughMemory)
        );

        for &at in &dest {
            delete(&mut store, &mut mem, at).unwrap();
        }
        assert_eq!(pool_cap(&store, pool).available, 15);

        // Everything merged back: 15 objects fit again, including an 8-block
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();
        assert_eq!(pool_cap(&store, pool).available, 0);
    }

    #[test]
    fn test_alloc_rejects_occupied_destination() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0010_0000, 16, 4);
        pool_retype(&mut store, &mut mem, pool, ObjectType::Endpoint, 0).unwrap();
        let dest = run(slots, 0, 3);
        root_untyped(&mut store, slots, 2, 0x0040_0000, 12);

        assert_eq!(pool_alloc(&mut store, &mut mem, pool, &dest), Err(CapError::DeleteFirst));
        assert!(store.slot(dest[0]).unwrap().is_null());
        assert_eq!(store.child_count(pool).unwrap(), 0);
    }

    #[test]
    fn test_pool_free_requires_child() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0010_0000, 16, 4);
        pool_retype(&mut store, &mut mem, pool, ObjectType::Notification, 0).unwrap();
        let dest = run(slots, 0, 2);
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();

        assert_eq!(
            pool_free(&mut store, &mut mem, pool, SlotRef::new(slots, 5)),
            Err(CapError::InvalidArgument)
        );
        pool_free(&mut store, &mut mem, pool, dest[1]).unwrap();
        assert!(store.slot(dest[1]).unwrap().is_null());
    }

    #[test]
    fn test_revoke_resets_pool() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0010_0000, 16, 4);
        pool_retype(&mut store, &mut mem, pool, ObjectType::CNode, 2).unwrap();
        let dest = run(slots, 0, 4);
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();

        revoke(&mut store, &mut mem, pool).unwrap();
        let cap = pool_cap(&store, pool);
        assert!(!cap.is_typed());
        assert_eq!(cap.available, 0);
        assert_eq!(store.child_count(pool).unwrap(), 0);
        assert!(dest.iter().all(|&at| store.slot(at).unwrap().is_null()));

        // A reset pool can be retyped to something else
        pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 0).unwrap();
    }

    #[test]
    fn test_failed_revoke_keeps_pool_typed() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0010_0000, 16, 4);
        pool_retype(&mut store, &mut mem, pool, ObjectType::CNode, 2).unwrap();
        let dest = run(slots, 0, 1);
        pool_alloc(&mut store, &mut mem, pool, &dest).unwrap();
        let live = store.object(dest[0]).unwrap().base();
        let before = pool_cap(&store, pool);

        // A non-empty CNode cannot be deleted, so the revoke stops there
        let storage = store.cnode_cap(dest[0]).unwrap().storage;
        let inner = root_untyped(&mut store, storage, 0, 0x0040_0000, 12);
        assert_eq!(revoke(&mut store, &mut mem, pool), Err(CapError::DeleteFirst));
        assert_eq!(pool_cap(&store, pool), before);
        assert_eq!(store.child_count(pool).unwrap(), 1);

        assert_eq!(
            pool_retype(&mut store, &mut mem, pool, ObjectType::CNode, 2),
            Err(CapError::RevokeFirst)
        );
        let more = run(slots, 1, 4);
        pool_alloc(&mut store, &mut mem, pool, &more).unwrap();
        assert!(more.iter().all(|&at| store.object(at).unwrap().base() != live));

        ops::clear(&mut store, inner).unwrap();
        revoke(&mut store, &mut mem, pool).unwrap();
        assert!(!pool_cap(&store, pool).is_typed());
        assert_eq!(store.child_count(pool).unwrap(), 0);
    }

    #[test]
    fn test_allocated_blocks_keep_ancestors_busy() {
        let (mut store, mut mem, pool, slots) = make_pool(0x0010_0000, 16, 5);
        pool_retype(&mut store, &mut mem, pool, ObjectType::Page, 0).unwrap();

        pool_alloc(&mut store, &mut mem, pool, &run(slots, 0, 7)).unwrap();
        pool_alloc(&mut store, &mut mem, pool, &run(slots, 7, 5)).unwrap();
        for index in [2, 8, 5] {
            delete(&mut store, &mut mem, SlotRef::new(slots, index)).unwrap();
        }
        pool_alloc(&mut store, &mut mem, pool, &run(slots, 12, 2)).unwrap();

        let cap = pool_cap(&store, pool);
        let buddy = Buddy::of(&cap);
        let mut live = 0;
        for at in run(slots, 0, 14) {
            if store.slot(at).unwrap().is_null() {
                continue;
            }
            live += 1;
            let idx = object_index(&cap, store.object(at).unwrap().base()).unwrap();
            for order in 0..=buddy.top {
                assert!(buddy.read_bit(&mem, idx, order), "object {idx}: order {order} not busy");
            }
        }
        assert_eq!(live, 11);
        assert_eq!(cap.available, 15 - 11);
    }
}
