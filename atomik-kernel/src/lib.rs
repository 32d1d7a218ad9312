//! # atomik-kernel
//!
//! The kernel side of the Atomik capability core.
//!
//! [`atomik_cap`] holds the capability logic and is generic over where
//! slots and objects live. This crate supplies that storage and wires it
//! to a machine:
//!
//! - [`cap`]: CNode slot arrays and boot capabilities
//! - [`memory`]: Physical memory arena and machine layout
//! - [`machine`]: Memory, MMU and thread table as one [`atomik_cap::ObjectMemory`]
//! - [`vspace`]: Boot page tables and address space activation
//! - [`task`] / [`sched`]: Thread table and run queue
//! - [`syscall`]: Syscall dispatcher
//! - [`selftest`]: Boot self-test suites
//!
//! # Execution Model
//!
//! Kernel entry is single-threaded and runs to completion. Every
//! operation takes `&mut KernelState`; the only global is the instance
//! behind [`global`] that trap entry uses.
//!
//! # Boot
//!
//! ```text
//! MachineConfig -> boot page tables -> root CNode -> Untyped carving
//! ```
//!
//! See [`KernelState::new`].

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cap;
pub mod global;
pub mod logging;
pub mod machine;
pub mod memory;
pub mod sched;
pub mod selftest;
pub mod state;
pub mod syscall;
pub mod task;
pub mod vspace;

#[cfg(test)]
mod testutil;

pub use state::KernelState;
