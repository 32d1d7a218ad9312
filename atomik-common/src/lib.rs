//! # atomik-common
//!
//! Shared types and constants for the Atomik kernel crates.
//!
//! This crate defines the pieces every other crate agrees on:
//! - [`PhysAddr`] / [`VirtAddr`]: address newtypes used in every object payload
//! - [`PhysMemory`](memory::PhysMemory): byte/word access to physical memory
//! - [`BootMemory`](boot::BootMemory): the free-memory and remap-window tuple
//!   handed over by boot code
//!
//! # no_std
//!
//! This crate is `#![no_std]` and only needs `alloc` for the frame-backed
//! [`SparseMemory`](memory::SparseMemory) store.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod addr;
pub mod boot;
pub mod memory;

// Re-export commonly used types
pub use addr::{PhysAddr, VirtAddr};
pub use boot::{BootMemory, KernelImage};
pub use memory::{PAGE_BITS, PAGE_SIZE, PhysMemory, SparseMemory};
