//! Atomik Syscall ABI
//!
//! Shared definitions for kernel-userspace communication.
//! This crate is `no_std` and has no dependencies, allowing it to be used
//! in both the kernel and userspace.
//!
//! # Convention
//!
//! A syscall traps with the number in `eax` and up to five arguments in
//! `ebx`, `ecx`, `edx`, `esi` and `edi`, in that order. The result comes
//! back in `eax`: zero or a positive value on success, `-code` on error.
//! Some calls return extra words in the argument registers.
//!
//! # Modules
//!
//! - [`numbers`] - Object classes and syscall numbers
//! - [`error`] - Error codes
//! - [`info`] - Register frame and the `cap_get_info` record

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod error;
pub mod info;
pub mod numbers;

pub use error::{ErrorCode, SyscallResult, check_result};
pub use info::{CapInfo, Register, SyscallFrame};
pub use numbers::{ObjectClass, Syscall};
