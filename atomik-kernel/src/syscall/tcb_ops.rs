//! TCB and scheduler syscall handlers
//!
//! - [`handle_tcb_config`]: bind a thread to its spaces and set priority
//! - [`handle_sched_push`] / [`handle_sched_pull`]: run queue membership
//! - [`handle_sched_yield`]: give up the CPU
//!
//! The dispatcher switches address spaces when the current thread
//! changes, so the handlers here only update the scheduler.

use atomik_cap::{CSpaceStore, CapError, CapObject, CapResult, SlotRef};
use atomik_common::PhysAddr;
use atomik_syscall::SyscallFrame;

use super::{SyscallResult, byte, resolve_arg};
use crate::state::KernelState;
use crate::task;

fn tcb_base(state: &KernelState, at: SlotRef) -> CapResult<PhysAddr> {
    match state.cspace.object(at)? {
        CapObject::Tcb(tcb) => Ok(tcb.base),
        _ => Err(CapError::InvalidCapability),
    }
}

/// Handle `tcb_config`.
///
/// # ABI
///
/// - `ebx`: TCB capability pointer
/// - `ecx`: depth, priority << 8
/// - `edx`: fault endpoint capability pointer
/// - `esi`: CSpace root (CNode) capability pointer
/// - `edi`: VSpace root (PageDirectory) capability pointer
///
/// All four pointers are resolved at the same depth. A CNode would be
/// descended into at full depth, so the CSpace root cannot use it.
pub fn handle_tcb_config(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let tcb_at = resolve_arg(state, frame, 0, 1)?;
    let fault_ep_at = resolve_arg(state, frame, 2, 1)?;
    let croot_at = resolve_arg(state, frame, 3, 1)?;
    let vroot_at = resolve_arg(state, frame, 4, 1)?;
    let priority = byte(frame.arg(1), 1) as u8;

    task::configure(
        &mut state.cspace,
        &mut state.machine.threads,
        tcb_at,
        fault_ep_at,
        croot_at,
        vroot_at,
        priority,
    )?;
    Ok(0)
}

/// Handle `sched_push`.
pub fn handle_sched_push(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let tcb = tcb_base(state, resolve_arg(state, frame, 0, 1)?)?;
    state.machine.threads.push(tcb)?;
    Ok(0)
}

/// Handle `sched_pull`.
pub fn handle_sched_pull(state: &mut KernelState, frame: &mut SyscallFrame) -> SyscallResult {
    let tcb = tcb_base(state, resolve_arg(state, frame, 0, 1)?)?;
    state.machine.threads.pull(tcb)?;
    Ok(0)
}

/// Handle `sched_yield`.
pub fn handle_sched_yield(state: &mut KernelState) -> SyscallResult {
    let next = state.machine.threads.schedule();
    log::trace!("yield: now running {:?}", next);
    Ok(0)
}
