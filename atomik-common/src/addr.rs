//! Physical and Virtual Address Types
//!
//! Address newtypes stored in capability payloads and passed to the paging
//! layer. They keep physical and virtual addresses apart at compile time.
//!
//! # Design
//!
//! Both types are `#[repr(transparent)]` wrappers around `u64`. The kernel
//! profile is 32-bit, so helpers that split a virtual address into table
//! indices assume the two-level 10/10/12 layout.

use core::fmt;

use crate::memory::{PAGE_BITS, align_down, align_up};

/// Physical memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// Virtual memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

/// Bits translated by one page directory entry (4 MiB).
const PD_SHIFT: u32 = 22;

/// Index mask for both translation levels (1024 entries).
const INDEX_MASK: u64 = 0x3FF;

impl PhysAddr {
    /// Create a new physical address.
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this address is null (zero).
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if this address is aligned to `2^bits`.
    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, bits: u32) -> bool {
        self.0 & ((1u64 << bits) - 1) == 0
    }

    /// Check if this address is page-aligned.
    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.is_aligned_to(PAGE_BITS)
    }

    /// Align up to a `2^bits` boundary.
    #[inline]
    #[must_use]
    pub const fn align_up_to(self, bits: u32) -> Self {
        Self(align_up(self.0, 1u64 << bits))
    }

    /// Align down to a `2^bits` boundary.
    #[inline]
    #[must_use]
    pub const fn align_down_to(self, bits: u32) -> Self {
        Self(align_down(self.0, 1u64 << bits))
    }

    /// Add an offset to this address.
    #[inline]
    #[must_use]
    pub const fn offset(self, offset: u64) -> Self {
        Self(self.0.wrapping_add(offset))
    }

    /// Distance in bytes from `base` to this address, if it lies above it.
    #[inline]
    #[must_use]
    pub const fn checked_offset_from(self, base: Self) -> Option<u64> {
        self.0.checked_sub(base.0)
    }

    /// Frame number of this address.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> u64 {
        self.0 >> PAGE_BITS
    }
}

impl VirtAddr {
    /// Create a new virtual address.
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this address is null (zero).
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if this address is page-aligned.
    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & ((1u64 << PAGE_BITS) - 1) == 0
    }

    /// Align this address down to a page boundary.
    #[inline]
    #[must_use]
    pub const fn page_align_down(self) -> Self {
        Self(align_down(self.0, 1u64 << PAGE_BITS))
    }

    /// Align this address down to the region covered by one page table.
    #[inline]
    #[must_use]
    pub const fn table_align_down(self) -> Self {
        Self(align_down(self.0, 1u64 << PD_SHIFT))
    }

    /// Add an offset to this address.
    #[inline]
    #[must_use]
    pub const fn offset(self, offset: u64) -> Self {
        Self(self.0.wrapping_add(offset))
    }

    /// Index into the page directory.
    #[inline]
    #[must_use]
    pub const fn pd_index(self) -> usize {
        ((self.0 >> PD_SHIFT) & INDEX_MASK) as usize
    }

    /// Index into the page table.
    #[inline]
    #[must_use]
    pub const fn pt_index(self) -> usize {
        ((self.0 >> PAGE_BITS) & INDEX_MASK) as usize
    }

    /// Offset within the page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & ((1u64 << PAGE_BITS) - 1)
    }
}

// -- Formatting implementations

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#010x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA:{:#010x}", self.0)
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA:{:#010x}", self.0)
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

// -- Conversion implementations

impl From<u64> for PhysAddr {
    #[inline]
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

impl From<PhysAddr> for u64 {
    #[inline]
    fn from(addr: PhysAddr) -> Self {
        addr.0
    }
}

impl From<u64> for VirtAddr {
    #[inline]
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

impl From<VirtAddr> for u64 {
    #[inline]
    fn from(addr: VirtAddr) -> Self {
        addr.0
    }
}
