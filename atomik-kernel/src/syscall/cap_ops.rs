//! Capability syscall handlers
//!
//! - [`handle_cap_get_info`]: describe a capability
//! - [`handle_cap_delete`]: delete a leaf capability
//! - [`handle_cap_revoke`]: delete everything derived from a capability
//! - [`handle_cap_drop`]: narrow the rights of a capability
//!
//! Every handler takes the capability as `ebx` (pointer) plus `ecx`
//! (depth, low byte).

use atomik_cap::{CSpaceStore, CapRights, ops};
use atomik_syscall::SyscallFrame;

use super::{SyscallResult, byte, resolve_arg};
use crate::state::KernelState;

/// Handle `cap_get_info`.
///
/// On success the [`CapInfo`](atomik_syscall::CapInfo) record replaces
/// the argument registers and `eax` holds the object type.
pub fn handle_cap_get_info(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let at = resolve_arg(state, frame, 0, 1)?;
    let info = state.cspace.object(at)?.info();
    info.store(frame);
    Ok(info.object_type as i32)
}

/// Handle `cap_delete`.
pub fn handle_cap_delete(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let at = resolve_arg(state, frame, 0, 1)?;
    ops::delete(&mut state.cspace, &mut state.machine, at)?;
    Ok(0)
}

/// Handle `cap_revoke`.
pub fn handle_cap_revoke(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let at = resolve_arg(state, frame, 0, 1)?;
    ops::revoke(&mut state.cspace, &mut state.machine, at)?;
    Ok(0)
}

/// Handle `cap_drop`.
///
/// `edx` (low byte) holds the access bits to remove.
pub fn handle_cap_drop(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let at = resolve_arg(state, frame, 0, 1)?;
    let remove = CapRights::from_bits(byte(frame.arg(2), 0) as u8);
    ops::drop_rights(&mut state.cspace, &mut state.machine, at, remove)?;
    Ok(0)
}
