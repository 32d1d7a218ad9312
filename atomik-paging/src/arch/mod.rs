//! Architecture-specific table formats

pub mod i386;
