//! Global kernel instance
//!
//! Trap entry has no context to pass along, so the booted
//! [`KernelState`] lives in a lazily initialised static. Library code and
//! tests work on a `KernelState` directly and never touch this module.

use atomik_cap::{CapError, CapResult};
use atomik_syscall::{ErrorCode, SyscallFrame};
use spin::{Mutex, Once};

use crate::memory::MachineConfig;
use crate::selftest;
use crate::state::KernelState;
use crate::syscall;

/// The kernel booted by [`init`].
static KERNEL: Once<Mutex<KernelState>> = Once::new();

/// Boot the global kernel on `config`.
///
/// Only the first call boots; later calls return the existing instance
/// whatever their configuration.
pub fn init(config: &MachineConfig) -> &'static Mutex<KernelState> {
    KERNEL.call_once(|| {
        let state = KernelState::new(config);
        log::info!(
            "kernel up: {} root untyped, {} MiB free",
            state.untyped_count,
            config.free_size >> 20
        );
        Mutex::new(state)
    })
}

/// Access the global kernel with a closure.
///
/// Returns `None` before [`init`].
pub fn with_kernel<R>(f: impl FnOnce(&mut KernelState) -> R) -> Option<R> {
    KERNEL.get().map(|kernel| f(&mut kernel.lock()))
}

/// Trap entry: run the syscall in `frame` on the global kernel.
///
/// Before [`init`] every call fails with `IllegalOperation`.
pub fn handle_syscall(frame: &mut SyscallFrame) -> i32 {
    with_kernel(|state| syscall::dispatch(state, frame)).unwrap_or_else(|| {
        log::error!("syscall {:#010x} before kernel init", frame.number());
        let ret = ErrorCode::from(CapError::IllegalOperation).as_return();
        frame.set_result(ret);
        ret
    })
}

/// Run the self-test on the global kernel.
///
/// # Errors
///
/// `TestFailed` if a suite fails, `IllegalOperation` before [`init`].
pub fn run_selftest() -> CapResult<()> {
    with_kernel(selftest::run_tests).unwrap_or(Err(CapError::IllegalOperation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomik_syscall::Syscall;

    // One test: the instance is shared by every test thread.
    #[test]
    fn test_global_kernel() {
        let first = init(&MachineConfig::default()) as *const _;
        let second = init(&MachineConfig::default()) as *const _;
        assert_eq!(first, second);

        let mut frame = SyscallFrame::new(Syscall::CapGetInfo.as_u32(), &[0xA000_0000, 12]);
        assert!(handle_syscall(&mut frame) > 0);
        assert_eq!(with_kernel(|state| state.halted), Some(false));
        assert_eq!(run_selftest(), Ok(()));
    }
}
