//! VSpace capability operations
//!
//! Pages and page tables move through a small state machine:
//!
//! ```text
//! Unmapped --map--> Mapped(vaddr, table) --remap--> Mapped(vaddr, table)
//!     ^                                                  |
//!     +-------------------- delete ----------------------+
//! ```
//!
//! There is no unmap operation; a mapping disappears when its capability
//! is deleted. The table walks themselves live in `atomik-paging`; this
//! module only keeps the capabilities and the hardware entries in step.

use atomik_common::{PhysAddr, VirtAddr};
use atomik_paging::arch::i386::{PageDirectory, PageTable, PageTableEntry, PgTable};
use atomik_paging::{PageAttributes, PagingError};

use crate::cnode::CSpaceStore;
use crate::error::{CapError, CapResult};
use crate::memory::ObjectMemory;
use crate::objects::{CapObject, PageCap};
use crate::rights::CapRights;
use crate::slot::SlotRef;

impl From<PagingError> for CapError {
    fn from(err: PagingError) -> Self {
        match err {
            PagingError::NotAligned | PagingError::NotPresent | PagingError::KernelRange => {
                Self::InvalidAddress
            }
            PagingError::AlreadyMapped => Self::UnmapFirst,
            PagingError::AllocationFailed => Self::NotEnoughMemory,
        }
    }
}

/// Install the page table in `pt_at` into the directory in `pd_at`.
///
/// `vaddr` is rounded down to the 4 MiB region the table will translate.
/// The directory entry carries the table capability's rights.
///
/// # Errors
///
/// - `InvalidCapability`: the slots do not hold a PageDirectory and a
///   PageTable
/// - `UnmapFirst`: the table is already mapped, or the region already has
///   another table
/// - `InvalidAddress`: the region lies in the kernel half
pub fn map_pagetable<S, M>(cs: &mut S, mem: &mut M, pd_at: SlotRef, pt_at: SlotRef, vaddr: VirtAddr) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::PageDirectory(pd) = cs.object(pd_at)? else {
        return Err(CapError::InvalidCapability);
    };
    let CapObject::PageTable(mut pt) = cs.object(pt_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if pt.is_mapped() {
        return Err(CapError::UnmapFirst);
    }

    let vaddr = vaddr.table_align_down();
    atomik_paging::map_pagetable(
        mem,
        PageDirectory::from_pa(pd.base),
        pt.base,
        vaddr,
        pt.rights.page_attributes(),
    )?;

    pt.pd = pd_at;
    pt.vaddr = vaddr;
    cs.slot_mut(pt_at)?.object = CapObject::PageTable(pt);
    log::debug!("map pt {} at {} in pd {}", pt.base, vaddr, pd.base);
    Ok(())
}

/// Install the page in `page_at` into the table in `pt_at`.
///
/// The table must already be mapped, and `vaddr` must fall in the region
/// it translates. The entry carries the page capability's rights.
///
/// # Errors
///
/// - `InvalidCapability`: the slots do not hold a PageTable and a Page
/// - `UnmapFirst`: the page is already mapped, or the entry maps another
///   frame
/// - `MapFirst`: the table is not mapped
/// - `InvalidAddress`: `vaddr` is unaligned or outside the table's region
pub fn map_page<S, M>(cs: &mut S, mem: &mut M, pt_at: SlotRef, page_at: SlotRef, vaddr: VirtAddr) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::PageTable(pt) = cs.object(pt_at)? else {
        return Err(CapError::InvalidCapability);
    };
    let CapObject::Page(mut page) = cs.object(page_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if page.is_mapped() {
        return Err(CapError::UnmapFirst);
    }
    if !vaddr.is_page_aligned() {
        return Err(CapError::InvalidAddress);
    }
    if !pt.is_mapped() {
        return Err(CapError::MapFirst);
    }
    if !pt.covers(vaddr) {
        return Err(CapError::InvalidAddress);
    }

    atomik_paging::map_page(
        mem,
        PageTable::from_pa(pt.base),
        page.base,
        vaddr,
        page.rights.page_attributes(),
    )?;
    mem.invalidate_page(vaddr);

    page.pt = pt_at;
    page.vaddr = vaddr;
    cs.slot_mut(page_at)?.object = CapObject::Page(page);
    log::debug!("map page {} at {} [{}]", page.base, vaddr, page.rights);
    Ok(())
}

/// Re-issue the entry of a mapped page with new attributes.
pub(crate) fn reissue_page<S, M>(cs: &S, mem: &mut M, page: &PageCap, attrs: PageAttributes) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::PageTable(pt) = cs.object(page.pt)? else {
        return Err(CapError::MapFirst);
    };
    atomik_paging::map_page(mem, PageTable::from_pa(pt.base), page.base, page.vaddr, attrs)?;
    mem.invalidate_page(page.vaddr);
    Ok(())
}

/// Narrow the entry of a mapped page to `attrs`.
///
/// Attributes the live entry already lacks, for instance after a
/// [`page_remap`], stay off.
pub(crate) fn restrict_page<S, M>(cs: &S, mem: &mut M, page: &PageCap, attrs: PageAttributes) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::PageTable(pt) = cs.object(page.pt)? else {
        return Err(CapError::MapFirst);
    };
    let live = PageTable::from_pa(pt.base).get_desc(&*mem, page.vaddr).attributes();
    reissue_page(cs, mem, page, attrs & live)
}

/// Change the attributes of a mapped page.
///
/// The new attributes are the page's rights restricted to `mask`; the
/// capability's own rights are unchanged.
///
/// # Errors
///
/// - `InvalidCapability`: the slot does not hold a Page
/// - `MapFirst`: the page is not mapped
/// - `AccessDenied`: the capability lacks the Remap right
pub fn page_remap<S, M>(cs: &mut S, mem: &mut M, page_at: SlotRef, mask: CapRights) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::Page(page) = cs.object(page_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if !page.is_mapped() {
        return Err(CapError::MapFirst);
    }
    if !page.rights.contains(CapRights::REMAP) {
        return Err(CapError::AccessDenied);
    }
    reissue_page(&*cs, mem, &page, (page.rights & mask).page_attributes())
}

/// Change the attributes of a mapped page table's directory entry.
///
/// # Errors
///
/// - `InvalidCapability`: the slot does not hold a PageTable
/// - `MapFirst`: the table is not mapped
/// - `AccessDenied`: the capability lacks the Remap right
pub fn pt_remap<S, M>(cs: &mut S, mem: &mut M, pt_at: SlotRef, mask: CapRights) -> CapResult<()>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::PageTable(pt) = cs.object(pt_at)? else {
        return Err(CapError::InvalidCapability);
    };
    if !pt.is_mapped() {
        return Err(CapError::MapFirst);
    }
    if !pt.rights.contains(CapRights::REMAP) {
        return Err(CapError::AccessDenied);
    }
    let CapObject::PageDirectory(pd) = cs.object(pt.pd)? else {
        return Err(CapError::MapFirst);
    };
    atomik_paging::map_pagetable(
        mem,
        PageDirectory::from_pa(pd.base),
        pt.base,
        pt.vaddr,
        (pt.rights & mask).page_attributes(),
    )?;
    mem.invalidate_page(pt.vaddr);
    Ok(())
}

/// Translate `vaddr` through the directory in `pd_at`.
///
/// `access` names the accesses the caller intends (Read, Write, Exec);
/// an empty set only requires the page to be present.
///
/// # Errors
///
/// - `InvalidCapability`: the slot does not hold a PageDirectory
/// - `InvalidAddress`: a level of the walk is not present
/// - `AccessDenied`: the mapping does not allow `access`
pub fn resolve<S, M>(cs: &S, mem: &M, pd_at: SlotRef, vaddr: VirtAddr, access: CapRights) -> CapResult<PhysAddr>
where
    S: CSpaceStore + ?Sized,
    M: ObjectMemory + ?Sized,
{
    let CapObject::PageDirectory(pd) = cs.object(pd_at)? else {
        return Err(CapError::InvalidCapability);
    };
    let (frame, attrs) =
        atomik_paging::resolve_page(mem, PageDirectory::from_pa(pd.base), vaddr.page_align_down())
            .map_err(|_| CapError::InvalidAddress)?;
    if !attrs.contains(access.required_attributes()) {
        return Err(CapError::AccessDenied);
    }
    Ok(frame.offset(vaddr.page_offset()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::untyped::retype;
    use crate::ops::{delete, drop_rights};
    use crate::slot::{CNodeId, ObjectType};
    use crate::testing::{TestMemory, TestStore, root_untyped};

    const TEXT: u64 = 0x0804_8000;

    struct Fixture {
        store: TestStore,
        mem: TestMemory,
        cnode: CNodeId,
        pd: SlotRef,
        pt: SlotRef,
        pages: [SlotRef; 4],
    }

    fn fixture() -> Fixture {
        let mut store = TestStore::new();
        let mut mem = TestMemory::new();
        let cnode = store.create_cnode(5).unwrap();
        let ut = root_untyped(&mut store, cnode, 0, 0x0010_0000, 16);
        let pd = SlotRef::new(cnode, 1);
        let pt = SlotRef::new(cnode, 2);
        let pages = core::array::from_fn(|i| SlotRef::new(cnode, 3 + i as u32));
        retype(&mut store, &mut mem, ut, ObjectType::PageDirectory, 0, &[pd]).unwrap();
        retype(&mut store, &mut mem, ut, ObjectType::PageTable, 0, &[pt]).unwrap();
        retype(&mut store, &mut mem, ut, ObjectType::Page, 0, &pages).unwrap();
        Fixture {
            store,
            mem,
            cnode,
            pd,
            pt,
            pages,
        }
    }

    #[test]
    fn test_map_and_resolve() {
        let Fixture {
            mut store,
            mut mem,
            pd,
            pt,
            pages,
            ..
        } = fixture();

        map_pagetable(&mut store, &mut mem, pd, pt, VirtAddr::new(TEXT)).unwrap();
        assert!(matches!(
            store.object(pt).unwrap(),
            CapObject::PageTable(t) if t.vaddr == VirtAddr::new(0x0800_0000)
        ));
        for (i, &page) in pages.iter().enumerate() {
            map_page(&mut store, &mut mem, pt, page, VirtAddr::new(TEXT + 0x1000 * i as u64)).unwrap();
        }

        let phys = resolve(&store, &mem, pd, VirtAddr::new(TEXT + 0x1234), CapRights::NONE).unwrap();
        assert_eq!(phys, store.object(pages[1]).unwrap().base().offset(0x234));
        assert_eq!(
            resolve(&store, &mem, pd, VirtAddr::new(TEXT + 0x8000), CapRights::NONE),
            Err(CapError::InvalidAddress)
        );
        assert_eq!(mem.invalidations.len(), 4);
    }

    #[test]
    fn test_map_state_machine() {
        let Fixture {
            mut store,
            mut mem,
            pd,
            pt,
            pages,
            ..
        } = fixture();

        assert_eq!(
            map_page(&mut store, &mut mem, pt, pages[0], VirtAddr::new(TEXT)),
            Err(CapError::MapFirst)
        );
        assert_eq!(
            map_pagetable(&mut store, &mut mem, pt, pd, VirtAddr::new(TEXT)),
            Err(CapError::InvalidCapability)
        );
        map_pagetable(&mut store, &mut mem, pd, pt, VirtAddr::new(TEXT)).unwrap();
        assert_eq!(
            map_pagetable(&mut store, &mut mem, pd, pt, VirtAddr::new(TEXT)),
            Err(CapError::UnmapFirst)
        );
        assert_eq!(
            map_page(&mut store, &mut mem, pt, pages[0], VirtAddr::new(0x0C00_0000)),
            Err(CapError::InvalidAddress)
        );
        assert_eq!(
            page_remap(&mut store, &mut mem, pages[0], CapRights::READ),
            Err(CapError::MapFirst)
        );
        map_page(&mut store, &mut mem, pt, pages[0], VirtAddr::new(TEXT)).unwrap();
        assert_eq!(
            map_page(&mut store, &mut mem, pt, pages[0], VirtAddr::new(TEXT + 0x1000)),
            Err(CapError::UnmapFirst)
        );
    }

    #[test]
    fn test_drop_write_is_enforced() {
        let Fixture {
            mut store,
            mut mem,
            pd,
            pt,
            pages,
            ..
        } = fixture();
        let va = VirtAddr::new(TEXT);
        map_pagetable(&mut store, &mut mem, pd, pt, va).unwrap();
        map_page(&mut store, &mut mem, pt, pages[0], va).unwrap();
        assert!(resolve(&store, &mem, pd, va, CapRights::WRITE).is_ok());

        drop_rights(&mut store, &mut mem, pages[0], CapRights::WRITE).unwrap();
        assert_eq!(resolve(&store, &mem, pd, va, CapRights::WRITE), Err(CapError::AccessDenied));
        assert!(resolve(&store, &mem, pd, va, CapRights::NONE).is_ok());
    }

    #[test]
    fn test_remap_masks_rights() {
        let Fixture {
            mut store,
            mut mem,
            pd,
            pt,
            pages,
            ..
        } = fixture();
        let va = VirtAddr::new(TEXT);
        map_pagetable(&mut store, &mut mem, pd, pt, va).unwrap();
        map_page(&mut store, &mut mem, pt, pages[0], va).unwrap();

        page_remap(&mut store, &mut mem, pages[0], CapRights::READ).unwrap();
        assert_eq!(resolve(&store, &mem, pd, va, CapRights::WRITE), Err(CapError::AccessDenied));
        page_remap(&mut store, &mut mem, pages[0], CapRights::ALL).unwrap();
        assert!(resolve(&store, &mem, pd, va, CapRights::WRITE).is_ok());

        drop_rights(&mut store, &mut mem, pages[0], CapRights::REMAP).unwrap();
        assert!(resolve(&store, &mem, pd, va, CapRights::WRITE).is_ok());
        assert_eq!(
            page_remap(&mut store, &mut mem, pages[0], CapRights::ALL),
            Err(CapError::AccessDenied)
        );

        pt_remap(&mut store, &mut mem, pt, CapRights::READ).unwrap();
        assert_eq!(resolve(&store, &mem, pd, va, CapRights::WRITE), Err(CapError::AccessDenied));
    }

    #[test]
    fn test_delete_removes_mapping() {
        let Fixture {
            mut store,
            mut mem,
            cnode,
            pd,
            pt,
            pages,
        } = fixture();
        let va = VirtAddr::new(TEXT);
        map_pagetable(&mut store, &mut mem, pd, pt, va).unwrap();
        map_page(&mut store, &mut mem, pt, pages[2], va).unwrap();

        delete(&mut store, &mut mem, pages[2]).unwrap();
        assert_eq!(resolve(&store, &mem, pd, va, CapRights::NONE), Err(CapError::InvalidAddress));
        assert!(store.slot(SlotRef::new(cnode, 5)).unwrap().is_null());

        delete(&mut store, &mut mem, pt).unwrap();
        let dir = PageDirectory::from_pa(store.object(pd).unwrap().base());
        assert!(dir.next_table(&mem, va).is_none());
    }

    #[test]
    fn test_drop_keeps_remapped_attributes() {
        let Fixture {
            mut store,
            mut mem,
            pd,
            pt,
            pages,
            ..
        } = fixture();
        let va = VirtAddr::new(TEXT);
        map_pagetable(&mut store, &mut mem, pd, pt, va).unwrap();
        map_page(&mut store, &mut mem, pt, pages[0], va).unwrap();

        page_remap(&mut store, &mut mem, pages[0], CapRights::READ).unwrap();
        drop_rights(&mut store, &mut mem, pages[0], CapRights::EXEC).unwrap();
        assert_eq!(resolve(&store, &mem, pd, va, CapRights::WRITE), Err(CapError::AccessDenied));
        assert!(resolve(&store, &mem, pd, va, CapRights::READ).is_ok());
        assert_eq!(store.object(pages[0]).unwrap().rights(), CapRights::ALL.remove(CapRights::EXEC));

        // Remap can still widen up to the remaining rights
        page_remap(&mut store, &mut mem, pages[0], CapRights::ALL).unwrap();
        assert!(resolve(&store, &mem, pd, va, CapRights::WRITE).is_ok());
    }

    #[test]
    fn test_tables_outlive_their_mappings() {
        let Fixture {
            mut store,
            mut mem,
            pd,
            pt,
            pages,
            ..
        } = fixture();
        let va = VirtAddr::new(TEXT);
        map_pagetable(&mut store, &mut mem, pd, pt, va).unwrap();
        map_page(&mut store, &mut mem, pt, pages[0], va).unwrap();

        assert_eq!(delete(&mut store, &mut mem, pt), Err(CapError::DeleteFirst));
        assert_eq!(delete(&mut store, &mut mem, pd), Err(CapError::DeleteFirst));
        assert!(matches!(store.object(pages[0]).unwrap(), CapObject::Page(p) if p.pt == pt));
        assert!(resolve(&store, &mem, pd, va, CapRights::WRITE).is_ok());

        // The rights of a page still go to its own table
        drop_rights(&mut store, &mut mem, pages[0], CapRights::GRANT).unwrap();
        assert!(resolve(&store, &mem, pd, va, CapRights::WRITE).is_ok());

        delete(&mut store, &mut mem, pages[0]).unwrap();
        assert_eq!(delete(&mut store, &mut mem, pd), Err(CapError::DeleteFirst));
        delete(&mut store, &mut mem, pt).unwrap();
        delete(&mut store, &mut mem, pd).unwrap();
    }
}
