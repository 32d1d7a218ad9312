//! Capability system kernel integration
//!
//! This module plugs the `atomik-cap` library into the kernel.
//!
//! # Components
//!
//! - [`cnode_storage`]: slot-array arena implementing [`CSpaceStore`]
//! - [`bootstrap`]: root CNode and boot Untyped capabilities
//!
//! [`CSpaceStore`]: atomik_cap::CSpaceStore

pub mod bootstrap;
pub mod cnode_storage;

pub use bootstrap::{BootCapabilities, capabilities_init};
pub use cnode_storage::CNodeTable;
