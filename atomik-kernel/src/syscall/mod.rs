//! Syscall interface
//!
//! This module implements the syscall dispatcher.
//!
//! # ABI
//!
//! - `eax`: syscall number, `(class << 24) | function`
//! - `ebx`, `ecx`, `edx`, `esi`, `edi`: arguments
//! - `eax`: return value (negative = `-ErrorCode`)
//!
//! The first argument is almost always a capability pointer and the low
//! byte of the second its depth. Pointers are resolved in the CSpace of
//! the current thread, or the kernel root CNode while idling. Argument
//! layouts of the individual calls are documented on their handlers.

extern crate alloc;

pub mod cap_ops;
pub mod mem_ops;
pub mod tcb_ops;

use alloc::vec::Vec;

use atomik_cap::{CSpaceStore, CapError, CapResult, SlotRef};
use atomik_syscall::{ErrorCode, Syscall, SyscallFrame};

use crate::state::KernelState;
use crate::vspace;

/// Handler result: the value for `eax` on success.
pub type SyscallResult = CapResult<i32>;

/// Run the syscall described by `frame` and store its result in `eax`.
///
/// Returns the value stored.
pub fn dispatch(state: &mut KernelState, frame: &mut SyscallFrame) -> i32 {
    let number = frame.number();
    let current = state.machine.threads.current();

    let result = match Syscall::from_number(number) {
        Some(syscall) => {
            log::trace!(
                "syscall {} (ebx={:#x}, ecx={:#x}, edx={:#x}, esi={:#x}, edi={:#x})",
                syscall.name(),
                frame.arg(0),
                frame.arg(1),
                frame.arg(2),
                frame.arg(3),
                frame.arg(4)
            );
            dispatch_syscall(state, syscall, frame)
        }
        None => {
            log::warn!("invalid syscall number {:#010x}", number);
            Err(CapError::InvalidSyscall)
        }
    };

    if state.machine.threads.current() != current {
        vspace::activate_current(state);
    }

    let value = match result {
        Ok(value) => value,
        Err(err) => {
            log::debug!("syscall {:#010x} failed: {}", number, err);
            ErrorCode::from(err).as_return()
        }
    };
    frame.set_result(value);
    value
}

fn dispatch_syscall(state: &mut KernelState, syscall: Syscall, frame: &mut SyscallFrame) -> SyscallResult {
    match syscall {
        Syscall::CapGetInfo => cap_ops::handle_cap_get_info(state, frame),
        Syscall::CapDelete => cap_ops::handle_cap_delete(state, frame),
        Syscall::CapRevoke => cap_ops::handle_cap_revoke(state, frame),
        Syscall::CapDrop => cap_ops::handle_cap_drop(state, frame),

        Syscall::UtRetype => mem_ops::handle_ut_retype(state, frame),
        Syscall::PageRemap => mem_ops::handle_page_remap(state, frame),
        Syscall::PtMapPage => mem_ops::handle_pt_map_page(state, frame),
        Syscall::PtRemap => mem_ops::handle_pt_remap(state, frame),
        Syscall::PdMapPt => mem_ops::handle_pd_map_pt(state, frame),
        Syscall::PoolRetype => mem_ops::handle_pool_retype(state, frame),
        Syscall::PoolAlloc => mem_ops::handle_pool_alloc(state, frame),
        Syscall::PoolFree => mem_ops::handle_pool_free(state, frame),

        Syscall::TcbConfig => tcb_ops::handle_tcb_config(state, frame),
        Syscall::SchedPush => tcb_ops::handle_sched_push(state, frame),
        Syscall::SchedPull => tcb_ops::handle_sched_pull(state, frame),
        Syscall::SchedYield => tcb_ops::handle_sched_yield(state),

        Syscall::DebugPutChar => {
            crate::logging::putc(frame.arg(0) as u8);
            Ok(0)
        }
        Syscall::DebugHalt => {
            log::info!("halt requested");
            state.halted = true;
            Ok(0)
        }
    }
}

// -- Argument decoding

/// Byte `n` of an argument word.
#[inline]
pub(crate) const fn byte(word: u32, n: u32) -> u32 {
    (word >> (8 * n)) & 0xFF
}

/// Resolve the capability named by arguments `cptr_arg` (pointer) and
/// `depth_arg` (depth in the low byte).
pub(crate) fn resolve_arg(
    state: &KernelState,
    frame: &SyscallFrame,
    cptr_arg: usize,
    depth_arg: usize,
) -> CapResult<SlotRef> {
    state.lookup(frame.arg(cptr_arg), byte(frame.arg(depth_arg), 0) as u8)
}

/// `count` consecutive slots of the CNode held in `cnode`, from `first`.
pub(crate) fn destination_slots(
    state: &KernelState,
    cnode: SlotRef,
    first: u32,
    count: u32,
) -> CapResult<Vec<SlotRef>> {
    if count == 0 {
        return Err(CapError::InvalidArgument);
    }
    (0..count)
        .map(|i| {
            let index = first.checked_add(i).ok_or(CapError::Range)?;
            state.cspace.cnode_slot(cnode, index)
        })
        .collect()
}
