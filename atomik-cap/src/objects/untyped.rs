//! Untyped memory capability
//!
//! Represents raw physical memory that can be retyped into other kernel
//! objects. Untyped memory is the root of all memory authority in the
//! system.
//!
//! # Watermark
//!
//! Each untyped region has a watermark tracking how much has been carved
//! out. The watermark only moves forward; it drops back to zero when the
//! last derived capability is deleted.
//!
//! # Retype Operation
//!
//! [`retype`]:
//! 1. Checks sufficient space remains (aligned watermark + count * size <= total)
//! 2. Creates each requested object at the next aligned address
//! 3. Advances the watermark past each committed object
//! 4. Links each new capability as a child of the untyped

use atomik_common::PhysAddr;
use atomik_common::memory::align_up;

use crate::cdt::CdtOps;
use crate::cnode::CSpaceStore;
use crate::error::{CapError, CapResult};
use crate::memory::ObjectMemory;
use crate::objects::{CapObject, object_size_bits};
use crate::ops;
use crate::rights::CapRights;
use crate::slot::{ObjectType, SlotRef};

/// Untyped capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UntypedCap {
    /// Physical base address (aligned to the region size).
    pub base: PhysAddr,
    /// Total size as log2 (size = 1 << size_bits).
    pub size_bits: u32,
    /// Access rights, inherited by every retyped object.
    pub rights: CapRights,
    /// Offset of the first byte not yet retyped.
    pub watermark: u64,
}

impl UntypedCap {
    /// Create an untouched untyped capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, size_bits: u32, rights: CapRights) -> Self {
        Self {
            base,
            size_bits,
            rights,
            watermark: 0,
        }
    }

    /// Total size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        1 << self.size_bits
    }

    /// Free space remaining above the watermark.
    #[inline]
    #[must_use]
    pub const fn free_space(&self) -> u64 {
        self.size().saturating_sub(self.watermark)
    }
}

/// Undoes a partially completed retype when dropped while armed.
struct Rollback<'a, S: CSpaceStore + ?Sized, M: ObjectMemory + ?Sized> {
    cs: &'a mut S,
    mem: &'a mut M,
    ut_at: SlotRef,
    watermark: u64,
    written: &'a [SlotRef],
    committed: usize,
    armed: bool,
}

impl<S: CSpaceStore + ?Sized, M: ObjectMemory + ?Sized> Drop for Rollback<'_, S, M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::debug!("retype: rolling back {} objects", self.committed);
        for &at in self.written[..self.committed].iter().rev() {
            if let Err(err) = ops::discard(self.cs, self.mem, at) {
                log::warn!("retype: rollback of {at} failed: {err}");
            }
        }
        set_watermark(self.cs, self.ut_at, self.watermark);
    }
}

fn set_watermark<S: CSpaceStore + ?Sized>(cs: &mut S, at: SlotRef, watermark: u64) {
    if let Ok(slot) = cs.slot_mut(at)
        && let CapObject::Untyped(ut) = &mut slot.object
    {
        ut.watermark = watermark;
    }
}

/// Carve `dest.len()` objects of type `ty` out of the untyped at `ut_at`.
///
/// # Parameters
///
/// - `ty`: Target object type
/// - `size_bits`: Region size for Untyped/Pool, entry-count log2 for CNode;
///   ignored for fixed-size types
/// - `dest`: Destination slots, one per object, all currently Null
///
/// # Errors
///
/// - `InvalidCapability`: `ut_at` does not hold an Untyped
/// - `InvalidArgument`: `dest` is empty
/// - `InvalidSize` / `InvalidType`: see [`object_size_bits`]
/// - `NotEnoughMemory`: the objects do not fit above the watermark
/// - `PagesOnly`: a kernel-manipulated type outside the remap window
/// - `DeleteFirst`: a destination slot is occupied
///
/// On error every slot written by this call is cleared again and the
/// watermark is restored.
pub fn retype<S, M>(
    cs: &mut S,
    mem: &mut M,
    ut_at: SlotRef,
    ty: ObjectType,
    size_bits: u32,
    dest: &[SlotRef],
) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::Untyped(ut) = cs.object(ut_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if dest.is_empty() {
        return Err(CapError::InvalidArgument);
    }

    let obj_bits = object_size_bits(ty, size_bits)?;
    let obj_size = 1u64 << obj_bits;
    let start = align_up(ut.watermark, obj_size);
    let end = (dest.len() as u64)
        .checked_mul(obj_size)
        .and_then(|total| start.checked_add(total))
        .ok_or(CapError::NotEnoughMemory)?;
    if end > ut.size() {
        return Err(CapError::NotEnoughMemory);
    }

    if ty.needs_kernel_mapping() && !mem.is_remappable(ut.base, ut.size()) {
        return Err(CapError::PagesOnly);
    }

    log::debug!(
        "retype {}: {} x {} (2^{}) at {:#x}",
        ut_at,
        dest.len(),
        ty,
        obj_bits,
        ut.base.as_u64() + start
    );

    let mut txn = Rollback {
        cs,
        mem,
        ut_at,
        watermark: ut.watermark,
        written: dest,
        committed: 0,
        armed: true,
    };

    for (i, &at) in dest.iter().enumerate() {
        let offset = start + i as u64 * obj_size;
        ops::init(txn.cs, txn.mem, at, ty, size_bits, ut.rights, ut.base.offset(offset))?;
        txn.committed += 1;
        txn.cs.add_child(ut_at, at)?;
        set_watermark(txn.cs, ut_at, offset + obj_size);
    }

    txn.armed = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestMemory, TestStore, root_untyped};

    #[test]
    fn test_untyped_creation() {
        let ut = UntypedCap::new(PhysAddr::new(0x1000), 12, CapRights::ALL);
        assert_eq!(ut.size(), 4096);
        assert_eq!(ut.free_space(), 4096);
    }

    #[test]
    fn test_retype_links_most_recent_first() {
        let mut store = TestStore::new();
        let mut mem = TestMemory::new();
        let cnode = store.create_cnode(4).unwrap();
        let ut = root_untyped(&mut store, cnode, 0, 0x0010_0000, 12);
        let dest: [SlotRef; 4] = core::array::from_fn(|i| SlotRef::new(cnode, 1 + i as u32));

        retype(&mut store, &mut mem, ut, ObjectType::Untyped, 5, &dest).unwrap();

        assert_eq!(store.links(ut).unwrap().child, dest[3]);
        assert!(store.children_consistent(ut).unwrap());
        assert_eq!(store.child_count(ut).unwrap(), 4);
        for (i, &at) in dest.iter().enumerate() {
            let CapObject::Untyped(child) = store.object(at).unwrap() else {
                panic!("expected untyped");
            };
            assert_eq!(child.base, PhysAddr::new(0x0010_0000 + 32 * i as u64));
            assert_eq!(child.size_bits, 5);
        }
        let CapObject::Untyped(parent) = store.object(ut).unwrap() else {
            panic!("expected untyped");
        };
        assert_eq!(parent.watermark, 128);
    }

    #[test]
    fn test_retype_aligns_watermark() {
        let mut store = TestStore::new();
        let mut mem = TestMemory::new();
        let cnode = store.create_cnode(4).unwrap();
        let ut = root_untyped(&mut store, cnode, 0, 0x0010_0000, 14);

        retype(&mut store, &mut mem, ut, ObjectType::Endpoint, 0, &[SlotRef::new(cnode, 1)]).unwrap();
        retype(&mut store, &mut mem, ut, ObjectType::Page, 0, &[SlotRef::new(cnode, 2)]).unwrap();

        assert_eq!(store.object(SlotRef::new(cnode, 2)).unwrap().base(), PhysAddr::new(0x0010_1000));
        let CapObject::Untyped(parent) = store.object(ut).unwrap() else {
            panic!("expected untyped");
        };
        assert_eq!(parent.watermark, 0x2000);
    }

    #[test]
    fn test_retype_not_enough_memory() {
        let mut store = TestStore::new();
        let mut mem = TestMemory::new();
        let cnode = store.create_cnode(4).unwrap();
        let ut = root_untyped(&mut store, cnode, 0, 0x0010_0000, 13);
        let dest = [SlotRef::new(cnode, 1), SlotRef::new(cnode, 2), SlotRef::new(cnode, 3)];

        assert_eq!(
            retype(&mut store, &mut mem, ut, ObjectType::Page, 0, &dest),
            Err(CapError::NotEnoughMemory)
        );
        assert_eq!(retype(&mut store, &mut mem, ut, ObjectType::Page, 0, &[]), Err(CapError::InvalidArgument));
        assert!(store.object(dest[0]).unwrap().object_type().is_null());
    }

    #[test]
    fn test_retype_pages_only_outside_window() {
        let mut store = TestStore::new();
        let mut mem = TestMemory::new();
        let cnode = store.create_cnode(4).unwrap();
        let ut = root_untyped(&mut store, cnode, 0, 0x0200_0000, 16);

        assert_eq!(
            retype(&mut store, &mut mem, ut, ObjectType::PageTable, 0, &[SlotRef::new(cnode, 1)]),
            Err(CapError::PagesOnly)
        );
        retype(&mut store, &mut mem, ut, ObjectType::Page, 0, &[SlotRef::new(cnode, 1)]).unwrap();
    }

    #[test]
    fn test_retype_rolls_back_on_occupied_slot() {
        let mut store = TestStore::new();
        let mut mem = TestMemory::new();
        let cnode = store.create_cnode(4).unwrap();
        let ut = root_untyped(&mut store, cnode, 0, 0x0010_0000, 16);
        root_untyped(&mut store, cnode, 3, 0x0020_0000, 12);
        let dest = [SlotRef::new(cnode, 1), SlotRef::new(cnode, 2), SlotRef::new(cnode, 3)];

        assert_eq!(
            retype(&mut store, &mut mem, ut, ObjectType::Page, 0, &dest),
            Err(CapError::DeleteFirst)
        );
        assert!(store.object(dest[0]).unwrap().object_type().is_null());
        assert!(store.object(dest[1]).unwrap().object_type().is_null());
        assert_eq!(store.child_count(ut).unwrap(), 0);
        let CapObject::Untyped(parent) = store.object(ut).unwrap() else {
            panic!("expected untyped");
        };
        assert_eq!(parent.watermark, 0);
    }
}
