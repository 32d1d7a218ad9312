//! i386 two-level paging
//!
//! - Page directory: 1024 entries, 4 MiB per entry
//! - Page table: 1024 entries, 4 KiB per entry

pub mod descriptors;
pub mod mapping;
pub mod tables;

pub use descriptors::*;
pub use mapping::*;
pub use tables::*;
