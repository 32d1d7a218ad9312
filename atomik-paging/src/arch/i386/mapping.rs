//! Table walks and mapping primitives
//!
//! These are the operations the VSpace manager consumes: install a page
//! table into a directory, install a page into a table, and walk a directory
//! back down to a page. Boot code additionally uses [`map_range`] to build
//! the kernel half, allocating page tables as it goes.

use atomik_common::{PAGE_SIZE, PhysAddr, PhysMemory, VirtAddr};

use super::descriptors::{PageDirectoryEntry, PageEntry, PageTableEntry};
use super::tables::{PageDirectory, PageTable, PgTable};
use crate::permissions::PageAttributes;
use crate::traits::{PageAllocator, PagingError};
use crate::{ENTRIES_PER_TABLE, KERNEL_PD_INDEX};

/// Install `pt` in the directory entry covering `va`.
///
/// Re-installing the same table with new attributes is allowed; replacing a
/// different table is not.
///
/// # Errors
///
/// `KernelRange` if `va` lies in the kernel half, `AlreadyMapped` if the
/// entry already points at another table.
pub fn map_pagetable<M: PhysMemory + ?Sized>(
    mem: &mut M,
    pd: PageDirectory,
    pt: PhysAddr,
    va: VirtAddr,
    attrs: PageAttributes,
) -> Result<(), PagingError> {
    if !pt.is_page_aligned() {
        return Err(PagingError::NotAligned);
    }
    if PageDirectory::index(va) >= KERNEL_PD_INDEX {
        return Err(PagingError::KernelRange);
    }
    let current = pd.get_desc(mem, va);
    if let Some(existing) = current.address()
        && existing != pt
    {
        return Err(PagingError::AlreadyMapped);
    }
    pd.set_desc(mem, va, PageDirectoryEntry::new(pt, attrs));
    log::trace!("pde {:?}[{:#x}] -> {:#x} {:?}", pd, PageDirectory::index(va), pt, attrs);
    Ok(())
}

/// Install `page` in the table entry covering `va`.
///
/// # Errors
///
/// `NotAligned` for an unaligned frame or address, `AlreadyMapped` if the
/// entry already maps another frame.
pub fn map_page<M: PhysMemory + ?Sized>(
    mem: &mut M,
    pt: PageTable,
    page: PhysAddr,
    va: VirtAddr,
    attrs: PageAttributes,
) -> Result<(), PagingError> {
    if !page.is_page_aligned() || !va.is_page_aligned() {
        return Err(PagingError::NotAligned);
    }
    let current = pt.get_desc(mem, va);
    if let Some(existing) = current.address()
        && existing != page
    {
        return Err(PagingError::AlreadyMapped);
    }
    pt.set_desc(mem, va, PageEntry::new(page, attrs));
    log::trace!("pte {:?}[{:#x}] -> {:#x} {:?}", pt, PageTable::index(va), page, attrs);
    Ok(())
}

/// Walk `pd` to the page table covering `va`.
///
/// # Errors
///
/// `NotPresent` if the directory entry is not present.
pub fn resolve_pagetable<M: PhysMemory + ?Sized>(
    mem: &M,
    pd: PageDirectory,
    va: VirtAddr,
) -> Result<(PageTable, PageAttributes), PagingError> {
    let pde = pd.get_desc(mem, va);
    let table = pde.address().ok_or(PagingError::NotPresent)?;
    Ok((PageTable::from_pa(table), pde.attributes()))
}

/// Walk `pd` down to the page mapped at `va`.
///
/// Returns the frame and the effective attributes: writable only if both
/// levels allow it, kernel-only if either level is.
///
/// # Errors
///
/// `NotPresent` if either level is not present.
pub fn resolve_page<M: PhysMemory + ?Sized>(
    mem: &M,
    pd: PageDirectory,
    va: VirtAddr,
) -> Result<(PhysAddr, PageAttributes), PagingError> {
    let (pt, dir_attrs) = resolve_pagetable(mem, pd, va)?;
    let pte = pt.get_desc(mem, va);
    let frame = pte.address().ok_or(PagingError::NotPresent)?;

    let mut attrs = pte.attributes();
    if !dir_attrs.contains(PageAttributes::WRITABLE) {
        attrs = attrs & !PageAttributes::WRITABLE;
    }
    if dir_attrs.contains(PageAttributes::KERNEL) {
        attrs = attrs | PageAttributes::KERNEL;
    }
    Ok((frame, attrs))
}

/// Translate `va` to a physical address through `pd`.
#[must_use]
pub fn translate<M: PhysMemory + ?Sized>(mem: &M, pd: PageDirectory, va: VirtAddr) -> Option<PhysAddr> {
    resolve_page(mem, pd, va.page_align_down())
        .ok()
        .map(|(frame, _)| frame.offset(va.page_offset()))
}

/// Map `[pa, pa + size)` at `va`, allocating page tables as needed.
///
/// Used at boot to build the kernel half; no kernel-range check is applied.
/// Directory entries created here are kernel read/write.
///
/// # Errors
///
/// `NotAligned` if any bound is unaligned, `AllocationFailed` if the
/// allocator runs dry, `AlreadyMapped` if a page is already present.
pub fn map_range<M: PhysMemory + ?Sized, A: PageAllocator>(
    mem: &mut M,
    pd: PageDirectory,
    va: VirtAddr,
    pa: PhysAddr,
    size: u64,
    attrs: PageAttributes,
    allocator: &mut A,
) -> Result<(), PagingError> {
    if !va.is_page_aligned() || !pa.is_page_aligned() || size % PAGE_SIZE as u64 != 0 {
        return Err(PagingError::NotAligned);
    }

    let mut offset = 0;
    while offset < size {
        let page_va = va.offset(offset);
        let pt = get_or_create_table(mem, pd, page_va, allocator)?;
        let pte = pt.get_desc(mem, page_va);
        if pte.is_present() {
            return Err(PagingError::AlreadyMapped);
        }
        pt.set_desc(mem, page_va, PageEntry::new(pa.offset(offset), attrs));
        offset += PAGE_SIZE as u64;
    }
    Ok(())
}

/// Get or create the page table covering `va`
fn get_or_create_table<M: PhysMemory + ?Sized, A: PageAllocator>(
    mem: &mut M,
    pd: PageDirectory,
    va: VirtAddr,
    allocator: &mut A,
) -> Result<PageTable, PagingError> {
    if let Some(pt) = pd.next_table(mem, va) {
        return Ok(pt);
    }
    let frame = allocator.allocate_table().ok_or(PagingError::AllocationFailed)?;
    let pt = PageTable::from_pa(frame);
    pt.clear(mem);
    pd.set_desc(mem, va, PageDirectoryEntry::new(frame, PageAttributes::KERNEL_RW));
    Ok(pt)
}

/// Copy every kernel-half directory entry from `from` into `to`.
///
/// This gives a fresh directory the same view of the kernel as the boot
/// directory.
pub fn clone_kernel_entries<M: PhysMemory + ?Sized>(mem: &mut M, from: PageDirectory, to: PageDirectory) {
    for index in KERNEL_PD_INDEX..ENTRIES_PER_TABLE {
        let pde = from.get_at(mem, index);
        to.set_at(mem, index, pde);
    }
}
