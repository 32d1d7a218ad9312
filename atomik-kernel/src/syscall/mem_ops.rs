//! Memory syscall handlers
//!
//! This module implements syscalls for memory management:
//! - Retype: create typed objects from untyped memory
//! - Pool: partition a pool and allocate or free its objects
//! - Map: install pages and page tables into an address space
//! - Remap: change the attributes of an existing mapping
//!
//! Packed argument words carry a depth in their low byte and further
//! fields in the higher bytes; see each handler.

use atomik_cap::objects::{pool, untyped};
use atomik_cap::{CapError, CapRights, ObjectType, vspace};
use atomik_common::VirtAddr;
use atomik_syscall::SyscallFrame;

use super::{SyscallResult, byte, destination_slots, resolve_arg};
use crate::state::KernelState;

fn object_type(raw: u32) -> Result<ObjectType, CapError> {
    ObjectType::from_raw(raw).ok_or(CapError::InvalidType)
}

/// Handle `ut_retype`.
///
/// # ABI
///
/// - `ebx`: Untyped capability pointer
/// - `ecx`: depth, object type << 8, size bits << 16
/// - `edx`: destination CNode capability pointer
/// - `esi`: destination depth, count << 8
/// - `edi`: first destination slot index
pub fn handle_ut_retype(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let ut_at = resolve_arg(state, frame, 0, 1)?;
    let ty = object_type(byte(frame.arg(1), 1))?;
    let size_bits = byte(frame.arg(1), 2);
    let dest_cnode = resolve_arg(state, frame, 2, 3)?;
    let dest = destination_slots(state, dest_cnode, frame.arg(4), frame.arg(3) >> 8)?;

    untyped::retype(&mut state.cspace, &mut state.machine, ut_at, ty, size_bits, &dest)?;
    Ok(0)
}

/// Handle `pool_retype`.
///
/// # ABI
///
/// - `ebx`: Pool capability pointer
/// - `ecx`: depth, object type << 8, size bits << 16
pub fn handle_pool_retype(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let pool_at = resolve_arg(state, frame, 0, 1)?;
    let ty = object_type(byte(frame.arg(1), 1))?;
    let size_bits = byte(frame.arg(1), 2);

    pool::pool_retype(&mut state.cspace, &mut state.machine, pool_at, ty, size_bits)?;
    Ok(0)
}

/// Handle `pool_alloc`.
///
/// # ABI
///
/// - `ebx`: Pool capability pointer
/// - `ecx`: depth
/// - `edx`: destination CNode capability pointer
/// - `esi`: destination depth, count << 8
/// - `edi`: first destination slot index
pub fn handle_pool_alloc(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let pool_at = resolve_arg(state, frame, 0, 1)?;
    let dest_cnode = resolve_arg(state, frame, 2, 3)?;
    let dest = destination_slots(state, dest_cnode, frame.arg(4), frame.arg(3) >> 8)?;

    pool::pool_alloc(&mut state.cspace, &mut state.machine, pool_at, &dest)?;
    Ok(0)
}

/// Handle `pool_free`.
///
/// # ABI
///
/// - `ebx`: Pool capability pointer
/// - `ecx`: depth
/// - `edx`: object capability pointer
/// - `esi`: object depth
pub fn handle_pool_free(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let pool_at = resolve_arg(state, frame, 0, 1)?;
    let obj_at = resolve_arg(state, frame, 2, 3)?;

    pool::pool_free(&mut state.cspace, &mut state.machine, pool_at, obj_at)?;
    Ok(0)
}

/// Handle `page_remap`.
///
/// `edx` (low byte) masks the page's rights to give the new attributes.
pub fn handle_page_remap(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let page_at = resolve_arg(state, frame, 0, 1)?;
    let mask = CapRights::from_bits(byte(frame.arg(2), 0) as u8);
    vspace::page_remap(&mut state.cspace, &mut state.machine, page_at, mask)?;
    Ok(0)
}

/// Handle `pt_remap`.
///
/// `edx` (low byte) masks the table's rights to give the new attributes.
pub fn handle_pt_remap(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let pt_at = resolve_arg(state, frame, 0, 1)?;
    let mask = CapRights::from_bits(byte(frame.arg(2), 0) as u8);
    vspace::pt_remap(&mut state.cspace, &mut state.machine, pt_at, mask)?;
    Ok(0)
}

/// Handle `pt_map_page`.
///
/// # ABI
///
/// - `ebx`, `ecx`: PageTable capability pointer and depth
/// - `edx`, `esi`: Page capability pointer and depth
/// - `edi`: virtual address
pub fn handle_pt_map_page(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let pt_at = resolve_arg(state, frame, 0, 1)?;
    let page_at = resolve_arg(state, frame, 2, 3)?;
    let vaddr = VirtAddr::new(u64::from(frame.arg(4)));
    vspace::map_page(&mut state.cspace, &mut state.machine, pt_at, page_at, vaddr)?;
    Ok(0)
}

/// Handle `pd_map_pt`.
///
/// # ABI
///
/// - `ebx`, `ecx`: PageDirectory capability pointer and depth
/// - `edx`, `esi`: PageTable capability pointer and depth
/// - `edi`: virtual address
pub fn handle_pd_map_pt(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let pd_at = resolve_arg(state, frame, 0, 1)?;
    let pt_at = resolve_arg(state, frame, 2, 3)?;
    let vaddr = VirtAddr::new(u64::from(frame.arg(4)));
    vspace::map_pagetable(&mut state.cspace, &mut state.machine, pd_at, pt_at, vaddr)?;
    Ok(0)
}
