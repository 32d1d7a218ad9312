//! Paging - i386 two-level page tables
//!
//! This crate is the architecture layer beneath the VSpace manager. It knows
//! how page directory and page table entries are encoded and how to walk
//! them, but nothing about capabilities.
//!
//! # Architecture
//!
//! - `permissions`: hardware-visible page attributes
//! - `traits`: table allocator, MMU control and the paging error type
//! - `arch::i386`: PDE/PTE descriptors, table views and the mapping walks
//! - `soft`: a software MMU holding the active translation root
//!
//! Tables live in physical memory and are accessed through
//! [`PhysMemory`](atomik_common::PhysMemory), so the same code drives real
//! frames or the sparse host-side store used by tests.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod permissions;
pub mod soft;
pub mod traits;

pub mod arch;

// Re-export commonly used types
pub use arch::i386::{
    clone_kernel_entries, map_page, map_pagetable, map_range, resolve_page, resolve_pagetable,
    translate,
};
pub use permissions::PageAttributes;
pub use soft::SoftMmu;
pub use traits::{BumpTableAllocator, Mmu, PageAllocator, PagingError};

/// Number of entries per page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Size of one descriptor in bytes.
pub const DESCRIPTOR_SIZE: u64 = 4;

/// Bytes covered by one page directory entry (4 MiB).
pub const TABLE_SPAN: u64 = 1 << 22;

/// First page directory index of the kernel half.
pub const KERNEL_PD_INDEX: usize = (atomik_common::boot::KERNEL_BASE >> 22) as usize;

const _: () = assert!(
    ENTRIES_PER_TABLE as u64 * DESCRIPTOR_SIZE == atomik_common::PAGE_SIZE as u64,
    "a table must fill exactly one page"
);
const _: () = assert!(
    ENTRIES_PER_TABLE as u64 * atomik_common::PAGE_SIZE as u64 == TABLE_SPAN,
    "one page table must cover 4 MiB"
);
