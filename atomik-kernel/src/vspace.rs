//! Kernel address spaces
//!
//! The boot page directory maps the kernel image and the remap window into
//! the kernel half. Every PageDirectory object starts with a copy of those
//! kernel entries, so switching to a thread's directory never loses the
//! kernel.

use atomik_cap::{CSpaceStore, CapObject};
use atomik_common::memory::align_up;
use atomik_common::{BootMemory, PAGE_SIZE, PhysAddr, PhysMemory};
use atomik_paging::arch::i386::{PageDirectory, PgTable};
use atomik_paging::{
    BumpTableAllocator, Mmu, PageAllocator, PageAttributes, PagingError, map_range,
};

use crate::memory::MachineConfig;
use crate::state::KernelState;

/// Build the boot page directory.
///
/// Tables come from `[config.tables_start, config.tables_end())`. The
/// kernel image and the remappable part of free memory are mapped
/// kernel read/write.
///
/// # Errors
///
/// `AllocationFailed` when the table region is exhausted.
pub fn build_boot_tables<M: PhysMemory + ?Sized>(
    mem: &mut M,
    config: &MachineConfig,
    boot: &BootMemory,
) -> Result<PhysAddr, PagingError> {
    let mut tables = BumpTableAllocator::new(config.tables_start, config.tables_end());
    let root = tables.allocate_table().ok_or(PagingError::AllocationFailed)?;
    let pd = PageDirectory::from_pa(root);
    pd.clear(mem);

    let kernel = config.kernel;
    map_range(
        mem,
        pd,
        kernel.virt,
        kernel.phys,
        align_up(kernel.size, PAGE_SIZE as u64),
        PageAttributes::KERNEL_RW,
        &mut tables,
    )?;
    map_range(
        mem,
        pd,
        boot.remap_start,
        boot.free_start,
        boot.remappable_size(),
        PageAttributes::KERNEL_RW,
        &mut tables,
    )?;

    log::info!(
        "boot tables: pd {}, {} KiB of tables, window {} -> {} ({} MiB)",
        root,
        (tables.watermark().as_u64() - config.tables_start.as_u64()) >> 10,
        boot.remap_start,
        boot.free_start,
        boot.remappable_size() >> 20
    );
    Ok(root)
}

/// Page directory the current thread runs on, or `None` for the boot
/// directory.
#[must_use]
pub fn current_root(state: &KernelState) -> Option<PhysAddr> {
    let tcb = state.machine.threads.current()?;
    let thread = state.machine.threads.get(tcb)?;
    if thread.vspace.is_null() {
        return None;
    }
    match state.cspace.object(thread.vspace) {
        Ok(CapObject::PageDirectory(pd)) => Some(pd.base),
        _ => None,
    }
}

/// Point the MMU at the current thread's address space.
pub fn activate_current(state: &mut KernelState) {
    let root = current_root(state);
    state.machine.mmu.switch_address_space(root);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{alloc_objects, booted};
    use atomik_cap::ObjectType;
    use atomik_common::VirtAddr;
    use atomik_paging::resolve_page;

    #[test]
    fn test_boot_tables_map_window() {
        let state = booted();
        let boot = *state.machine.arena.boot();
        let pd = PageDirectory::from_pa(state.machine.mmu.boot_root());

        let (frame, attrs) = resolve_page(&state.machine.arena, pd, boot.remap_start).unwrap();
        assert_eq!(frame, boot.free_start);
        assert!(attrs.contains(PageAttributes::KERNEL_RW));

        let kernel = MachineConfig::default().kernel;
        let (frame, _) = resolve_page(&state.machine.arena, pd, kernel.virt).unwrap();
        assert_eq!(frame, kernel.phys);

        let past = boot.remap_start.offset(boot.remappable_size());
        assert_eq!(resolve_page(&state.machine.arena, pd, past), Err(PagingError::NotPresent));
    }

    #[test]
    fn test_table_region_too_small() {
        let config = MachineConfig {
            tables_start: PhysAddr::new(0x001F_E000),
            ..MachineConfig::default()
        };
        let boot = config.boot_memory().unwrap();
        let mut mem = atomik_common::SparseMemory::new();
        assert_eq!(
            build_boot_tables(&mut mem, &config, &boot),
            Err(PagingError::AllocationFailed)
        );
    }

    #[test]
    fn test_activate_follows_current_thread() {
        let mut state = booted();
        let [tcb, ep, cnode, pd] = alloc_objects(
            &mut state,
            &[
                (ObjectType::ThreadControlBlock, 0),
                (ObjectType::Endpoint, 0),
                (ObjectType::CNode, 4),
                (ObjectType::PageDirectory, 0),
            ],
        );
        crate::task::configure(&mut state.cspace, &mut state.machine.threads, tcb, ep, cnode, pd, 0)
            .unwrap();
        let tcb_base = state.cspace.object(tcb).unwrap().base();
        let pd_base = state.cspace.object(pd).unwrap().base();

        activate_current(&mut state);
        assert_eq!(state.machine.mmu.current_root(), state.machine.mmu.boot_root());

        state.machine.threads.push(tcb_base).unwrap();
        activate_current(&mut state);
        assert_eq!(state.machine.mmu.current_root(), pd_base);

        // The kernel stays visible through the thread's directory.
        let mut buf = [0u8; 4];
        state
            .machine
            .mmu
            .read_virt(&state.machine.arena, VirtAddr::new(0xD040_0000), &mut buf)
            .unwrap();
    }
}
