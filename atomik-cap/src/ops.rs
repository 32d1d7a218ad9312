//! Capability operations
//!
//! Core operations for manipulating capabilities:
//!
//! - [`init`]: Populate an empty slot with a freshly created object
//! - [`delete`]: Remove a single leaf capability
//! - [`revoke`]: Remove all derived capabilities, bottom-up
//! - [`drop_rights`]: Narrow the rights of a capability in place
//!
//! # Rights Attenuation
//!
//! Rights can only be reduced, never increased. Dropping a right from a
//! mapped page also re-issues its page table entry, so the hardware view
//! follows the capability.
//!
//! # CDT Integration
//!
//! Only leaves of the derivation tree may be deleted, and boot
//! capabilities (no parent) may never be deleted. Deleting the last child
//! of an Untyped rewinds its watermark; deleting a child of a typed Pool
//! returns the object to the buddy allocator.

use atomik_common::PhysAddr;
use atomik_paging::arch::i386::{
    PageDirectory, PageDirectoryEntry, PageEntry, PageTable, PageTableEntry, PgTable,
};
use atomik_paging::{ENTRIES_PER_TABLE, KERNEL_PD_INDEX, clone_kernel_entries};

use crate::cdt::CdtOps;
use crate::cnode::CSpaceStore;
use crate::error::{CapError, CapResult};
use crate::memory::{BoundSpace, ObjectMemory};
use crate::objects::{
    CNodeCap, CapObject, EndpointCap, NotificationCap, PageCap, PageDirectoryCap, PageTableCap,
    PoolCap, TcbCap, UntypedCap, object_size_bits, pool,
};
use crate::rights::CapRights;
use crate::slot::{CapSlot, CdtLinks, ObjectType, SlotRef};
use crate::vspace;

/// Reset a slot to Null with empty links.
///
/// # Errors
///
/// `Range` if the slot does not exist.
pub fn clear<S: CSpaceStore + ?Sized>(cs: &mut S, at: SlotRef) -> CapResult<()> {
    cs.slot_mut(at)?.clear();
    Ok(())
}

/// Create an object of type `ty` at `base` and install it in `at`.
///
/// Object memory is zeroed for every kernel-visible type. A new
/// PageDirectory also receives the kernel half of the boot directory, and
/// a new TCB is registered with the thread table. The slot is left without
/// derivation links.
///
/// # Parameters
///
/// - `size_bits`: Region size for Untyped/Pool, entry-count log2 for
///   CNode; ignored for fixed-size types
/// - `rights`: Rights of the new capability
/// - `base`: Physical base of the object, aligned to its size
///
/// # Errors
///
/// - `DeleteFirst`: the slot is occupied
/// - `InvalidType` / `InvalidSize`: see [`object_size_bits`]
/// - `NotEnoughMemory`: no room for another CNode slot array
pub fn init<S, M>(
    cs: &mut S,
    mem: &mut M,
    at: SlotRef,
    ty: ObjectType,
    size_bits: u32,
    rights: CapRights,
    base: PhysAddr,
) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    if !cs.slot(at)?.is_null() {
        return Err(CapError::DeleteFirst);
    }
    let obj_bits = object_size_bits(ty, size_bits)?;
    let obj_size = 1u64 << obj_bits;

    let object = match ty {
        ObjectType::Null => return Err(CapError::InvalidType),
        ObjectType::Untyped => CapObject::Untyped(UntypedCap::new(base, obj_bits, rights)),
        ObjectType::Pool => CapObject::Pool(PoolCap::new(base, obj_bits, rights)),
        ObjectType::CNode => {
            let storage = cs.create_cnode(size_bits)?;
            mem.zero(base, obj_size);
            CapObject::CNode(CNodeCap::new(base, storage, size_bits, rights))
        }
        ObjectType::Page => {
            mem.zero(base, obj_size);
            CapObject::Page(PageCap::new(base, rights))
        }
        ObjectType::PageTable => {
            mem.zero(base, obj_size);
            CapObject::PageTable(PageTableCap::new(base, rights))
        }
        ObjectType::PageDirectory => {
            mem.zero(base, obj_size);
            let boot = PageDirectory::from_pa(mem.kernel_directory());
            clone_kernel_entries(mem, boot, PageDirectory::from_pa(base));
            CapObject::PageDirectory(PageDirectoryCap::new(base, rights))
        }
        ObjectType::Endpoint => {
            mem.zero(base, obj_size);
            CapObject::Endpoint(EndpointCap::new(base, rights))
        }
        ObjectType::Notification => {
            mem.zero(base, obj_size);
            CapObject::Notification(NotificationCap::new(base, rights))
        }
        ObjectType::ThreadControlBlock => {
            mem.zero(base, obj_size);
            mem.create_thread(base);
            CapObject::Tcb(TcbCap::new(base, rights))
        }
    };

    *cs.slot_mut(at)? = CapSlot {
        object,
        links: CdtLinks::EMPTY,
    };
    log::trace!("init {at}: {object}");
    Ok(())
}

/// Delete the leaf capability in `at`.
///
/// # Errors
///
/// - `RevokeFirst`: the capability has children
/// - `IllegalOperation`: the capability has no parent (boot capability or
///   empty slot)
/// - `DeleteFirst`: a CNode whose slot array still holds capabilities, or
///   a PageTable/PageDirectory that still has pages or tables mapped in it
/// - `InvalidArgument`: a Pool child whose base is not a pool object
pub fn delete<S, M>(cs: &mut S, mem: &mut M, at: SlotRef) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let slot = *cs.slot(at)?;
    if slot.has_children() {
        return Err(CapError::RevokeFirst);
    }
    let parent = slot.links.parent;
    if parent.is_null() {
        return Err(CapError::IllegalOperation);
    }

    let parent_object = cs.object(parent)?;
    if let CapObject::Pool(pool) = &parent_object
        && pool.is_typed()
    {
        pool::object_index(pool, slot.object.base())?;
    }
    if let CapObject::CNode(cnode) = &slot.object
        && !cs.is_cnode_empty(cnode.storage)
    {
        return Err(CapError::DeleteFirst);
    }
    if has_mappings(&*mem, &slot.object) {
        return Err(CapError::DeleteFirst);
    }

    teardown(cs, mem, &slot.object)?;
    cs.unlink(at)?;

    match parent_object {
        CapObject::Untyped(mut ut) if !cs.slot(parent)?.has_children() => {
            ut.watermark = 0;
            cs.slot_mut(parent)?.object = CapObject::Untyped(ut);
        }
        CapObject::Pool(mut pool) if pool.is_typed() => {
            pool::free_object(mem, &mut pool, slot.object.base())?;
            cs.slot_mut(parent)?.object = CapObject::Pool(pool);
        }
        _ => {}
    }

    cs.slot_mut(at)?.clear();
    log::trace!("deleted {at}");
    Ok(())
}

/// Check whether a table still holds entries installed through other
/// capabilities: pages in a PageTable, user-half tables in a PageDirectory.
///
/// Those capabilities point back at the table's slot, so the table must
/// outlive their mappings.
fn has_mappings<M: ObjectMemory + ?Sized>(mem: &M, object: &CapObject) -> bool {
    match *object {
        CapObject::PageTable(pt) => PageTable::from_pa(pt.base).any_present(mem, 0..ENTRIES_PER_TABLE),
        CapObject::PageDirectory(pd) => {
            PageDirectory::from_pa(pd.base).any_present(mem, 0..KERNEL_PD_INDEX)
        }
        _ => false,
    }
}

/// Undo the side effects an object has outside its own slot.
fn teardown<S, M>(cs: &mut S, mem: &mut M, object: &CapObject) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    match *object {
        CapObject::CNode(cnode) => {
            cs.destroy_cnode(cnode.storage)?;
            if let Some(tcb) = cnode.tcb {
                mem.detach_thread(tcb, BoundSpace::CSpace);
            }
        }
        CapObject::PageDirectory(pd) => {
            if let Some(tcb) = pd.tcb {
                mem.detach_thread(tcb, BoundSpace::VSpace);
            }
        }
        CapObject::Tcb(tcb) => {
            let binding = mem.release_thread(tcb.base);
            unbind(cs, binding.cspace, tcb.base);
            unbind(cs, binding.vspace, tcb.base);
        }
        CapObject::Page(page) if page.is_mapped() => {
            if let Ok(CapObject::PageTable(pt)) = cs.object(page.pt) {
                let table = PageTable::from_pa(pt.base);
                if table.get_desc(&*mem, page.vaddr).address() == Some(page.base) {
                    table.set_desc(mem, page.vaddr, PageEntry::invalid());
                    mem.invalidate_page(page.vaddr);
                }
            }
        }
        CapObject::PageTable(pt) if pt.is_mapped() => {
            if let Ok(CapObject::PageDirectory(pd)) = cs.object(pt.pd) {
                let dir = PageDirectory::from_pa(pd.base);
                if dir.get_desc(&*mem, pt.vaddr).address() == Some(pt.base) {
                    dir.set_desc(mem, pt.vaddr, PageDirectoryEntry::invalid());
                    mem.invalidate_page(pt.vaddr);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Clear the thread back-pointer in a bound CNode or PageDirectory.
fn unbind<S: CSpaceStore + ?Sized>(cs: &mut S, at: SlotRef, tcb: PhysAddr) {
    if at.is_null() {
        return;
    }
    let Ok(slot) = cs.slot_mut(at) else {
        return;
    };
    match &mut slot.object {
        CapObject::CNode(cnode) if cnode.tcb == Some(tcb) => cnode.tcb = None,
        CapObject::PageDirectory(pd) if pd.tcb == Some(tcb) => pd.tcb = None,
        _ => {}
    }
}

/// Delete every capability derived from `at`, bottom-up.
///
/// Children are processed head to tail; each child's subtree is torn down
/// before the child itself is deleted. A Pool is reset to the untyped
/// state once all its children are gone.
///
/// # Errors
///
/// The first error raised by a nested delete.
pub fn revoke<S, M>(cs: &mut S, mem: &mut M, at: SlotRef) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    match cs.object(at)? {
        CapObject::Pool(_) => pool::pool_revoke(cs, mem, at),
        _ => revoke_children(cs, mem, at),
    }
}

/// Revoke and delete each child of `at` in list order.
pub(crate) fn revoke_children<S, M>(cs: &mut S, mem: &mut M, at: SlotRef) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let mut child = cs.links(at)?.child;
    while !child.is_null() {
        let next = cs.links(child)?.next;
        revoke(cs, mem, child)?;
        delete(cs, mem, child)?;
        child = next;
    }
    Ok(())
}

/// Remove `remove` from the rights of the capability in `at`.
///
/// A mapped page is re-mapped with the narrowed attributes before the slot
/// is updated. Attributes a remap already took away stay off.
///
/// # Errors
///
/// - `InvalidCapability`: the slot is empty
/// - `RevokeFirst`: the capability has children
pub fn drop_rights<S, M>(cs: &mut S, mem: &mut M, at: SlotRef, remove: CapRights) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let slot = *cs.slot(at)?;
    if slot.is_null() {
        return Err(CapError::InvalidCapability);
    }
    if slot.has_children() {
        return Err(CapError::RevokeFirst);
    }

    let rights = slot.rights().remove(remove);
    if let CapObject::Page(page) = slot.object
        && page.is_mapped()
    {
        vspace::restrict_page(&*cs, mem, &page, rights.page_attributes())?;
    }
    cs.slot_mut(at)?.object.set_rights(rights);
    log::trace!("drop {at}: {} -> {rights}", slot.rights());
    Ok(())
}

/// Tear down a capability created by an operation that is being rolled
/// back. Unlike [`delete`], the parent is left untouched.
pub(crate) fn discard<S, M>(cs: &mut S, mem: &mut M, at: SlotRef) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    cs.unlink(at)?;
    match cs.object(at)? {
        CapObject::CNode(cnode) => cs.destroy_cnode(cnode.storage)?,
        CapObject::Tcb(tcb) => {
            mem.release_thread(tcb.base);
        }
        _ => {}
    }
    clear(cs, at)
}
