//! Atomik Capability Core
//!
//! This crate implements the object-management core of the Atomik
//! microkernel: every kernel resource is named by a capability held in a
//! slot, and every object is carved out of physical memory through one.
//!
//! # Core Types
//!
//! - [`CapRights`]: Access bits (exec, write, read, grant, remap)
//! - [`CapSlot`]: One capability plus its derivation links
//! - [`SlotRef`]: Address of a slot (CNode handle + index)
//! - [`CapObject`]: Per-type payload, one variant per object type
//!
//! # Object Types
//!
//! | Category | Types |
//! |----------|-------|
//! | Memory | Untyped, Pool |
//! | Translation | Page, PageTable, PageDirectory |
//! | Execution | CNode, TCB |
//! | IPC | Endpoint, Notification |
//!
//! # Operations
//!
//! - [`objects::untyped::retype`]: Carve objects from untyped memory
//! - [`objects::pool`]: Buddy-managed pools of same-typed objects
//! - [`ops`]: Delete, revoke and drop rights
//! - [`vspace`]: Map pages and page tables, resolve virtual addresses
//! - [`cptr`]: Guarded capability pointer resolution
//!
//! # Derivation Tree (CDT)
//!
//! Every capability created from another records it as its parent; the
//! [`cdt`] module keeps the parent/child/sibling links inside the slots.
//! A capability with children cannot be deleted, and revoking it deletes
//! its whole subtree bottom-up.
//!
//! # Kernel Integration
//!
//! This crate defines the capability logic; the kernel provides storage.
//! The [`CSpaceStore`] and [`ObjectMemory`] traits define the interface
//! between `atomik-cap` and `atomik-kernel`.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

#[cfg(test)]
extern crate alloc;

pub mod cdt;
pub mod cnode;
pub mod cptr;
mod error;
pub mod memory;
pub mod objects;
pub mod ops;
mod rights;
mod slot;
pub mod vspace;

#[cfg(test)]
mod testing;

pub use cdt::CdtOps;
pub use cnode::CSpaceStore;
pub use cptr::{LookupFault, lookup};
pub use error::{CapError, CapResult};
pub use memory::{BoundSpace, ObjectMemory, ThreadBinding};
pub use objects::CapObject;
pub use rights::CapRights;
pub use slot::{CNodeId, CapSlot, CdtLinks, ObjectType, SlotRef};
