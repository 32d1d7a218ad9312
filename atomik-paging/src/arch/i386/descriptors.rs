//! i386 page directory and page table entries
//!
//! Both levels share one 32-bit format:
//! ```text
//! +---------------------------+-----+---+---+---+---+---+---+---+---+---+
//! |   Frame address [31:12]   | AVL | G | S | D | A |PCD|PWT|U/S|R/W| P |
//! +---------------------------+-----+---+---+---+---+---+---+---+---+---+
//!  31                      12  11  9  8   7   6   5   4   3   2   1   0
//! ```
//! The MMU has no execute-disable bit, so a present entry is readable and
//! executable. Effective rights of a page are the intersection of its PDE
//! and PTE rights.

use tock_registers::{
    interfaces::{ReadWriteable, Readable},
    register_bitfields,
    registers::InMemoryRegister,
};

use atomik_common::{PAGE_BITS, PhysAddr};

use crate::permissions::PageAttributes;

register_bitfields![u32,
    /// Fields common to PDEs and PTEs
    pub EntryFields [
        /// Entry is present
        PRESENT OFFSET(0) NUMBITS(1) [],
        /// Writes allowed
        WRITABLE OFFSET(1) NUMBITS(1) [],
        /// Reachable from user mode
        USER OFFSET(2) NUMBITS(1) [],
        /// Write-through caching
        WRITE_THROUGH OFFSET(3) NUMBITS(1) [],
        /// Caching disabled
        CACHE_DISABLE OFFSET(4) NUMBITS(1) [],
        /// Set by hardware on access
        ACCESSED OFFSET(5) NUMBITS(1) [],
        /// Set by hardware on write (PTE only)
        DIRTY OFFSET(6) NUMBITS(1) [],
        /// 4 MiB page (PDE only, unused)
        LARGE OFFSET(7) NUMBITS(1) [],
        /// Global translation (survives address space switch)
        GLOBAL OFFSET(8) NUMBITS(1) [],
        /// Frame number of the next table or the page
        FRAME OFFSET(12) NUMBITS(20) []
    ]
];

type EntryRegister = InMemoryRegister<u32, EntryFields::Register>;

/// Trait for page table entry operations
pub trait PageTableEntry: Sized + Copy {
    /// Wrap a raw entry value.
    fn from_raw(value: u32) -> Self;

    /// Raw entry value.
    fn as_raw(self) -> u32;

    /// Entry with every bit clear.
    #[inline]
    fn invalid() -> Self {
        Self::from_raw(0)
    }

    /// Encode `target` with `attrs`. A non-present attribute set yields an
    /// invalid entry.
    #[inline]
    fn new(target: PhysAddr, attrs: PageAttributes) -> Self {
        Self::from_raw(encode(target, attrs))
    }

    /// Check the present bit.
    #[inline]
    fn is_present(self) -> bool {
        EntryRegister::new(self.as_raw()).is_set(EntryFields::PRESENT)
    }

    /// Frame this entry points at, if present.
    #[inline]
    fn address(self) -> Option<PhysAddr> {
        if !self.is_present() {
            return None;
        }
        let frame = EntryRegister::new(self.as_raw()).read(EntryFields::FRAME);
        Some(PhysAddr::new(u64::from(frame) << PAGE_BITS))
    }

    /// Attributes encoded in this entry.
    #[inline]
    fn attributes(self) -> PageAttributes {
        decode(self.as_raw())
    }

    /// Same target with new attributes.
    #[inline]
    fn with_attributes(self, attrs: PageAttributes) -> Self {
        match self.address() {
            Some(target) => Self::new(target, attrs),
            None => Self::invalid(),
        }
    }
}

fn encode(target: PhysAddr, attrs: PageAttributes) -> u32 {
    if !attrs.is_present() {
        return 0;
    }
    debug_assert!(target.is_page_aligned());
    let reg = EntryRegister::new(0);
    reg.modify(EntryFields::FRAME.val((target.as_u64() >> PAGE_BITS) as u32) + EntryFields::PRESENT::SET);
    if attrs.contains(PageAttributes::WRITABLE) {
        reg.modify(EntryFields::WRITABLE::SET);
    }
    if !attrs.contains(PageAttributes::KERNEL) {
        reg.modify(EntryFields::USER::SET);
    }
    reg.get()
}

fn decode(raw: u32) -> PageAttributes {
    let reg = EntryRegister::new(raw);
    if !reg.is_set(EntryFields::PRESENT) {
        return PageAttributes::NONE;
    }
    let mut attrs = PageAttributes::PRESENT | PageAttributes::READABLE | PageAttributes::EXECUTABLE;
    if reg.is_set(EntryFields::WRITABLE) {
        attrs = attrs | PageAttributes::WRITABLE;
    }
    if !reg.is_set(EntryFields::USER) {
        attrs = attrs | PageAttributes::KERNEL;
    }
    attrs
}

/// Page directory entry (points at a page table)
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PageDirectoryEntry(u32);

impl PageTableEntry for PageDirectoryEntry {
    #[inline]
    fn from_raw(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    fn as_raw(self) -> u32 {
        self.0
    }
}

/// Page table entry (points at a 4 KiB frame)
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PageEntry(u32);

impl PageTableEntry for PageEntry {
    #[inline]
    fn from_raw(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    fn as_raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Debug for PageDirectoryEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.address() {
            Some(pa) => write!(f, "PDE::Table({:#x}, {:?})", pa, self.attributes()),
            None => write!(f, "PDE::Invalid"),
        }
    }
}

impl core::fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.address() {
            Some(pa) => write!(f, "PTE::Page({:#x}, {:?})", pa, self.attributes()),
            None => write!(f, "PTE::Invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rw_encoding() {
        let attrs = PageAttributes::PRESENT | PageAttributes::WRITABLE;
        let pte = PageEntry::new(PhysAddr::new(0x0123_4000), attrs);
        assert_eq!(pte.as_raw(), 0x0123_4000 | 0b111);
        assert_eq!(pte.address(), Some(PhysAddr::new(0x0123_4000)));
    }

    #[test]
    fn test_kernel_ro_encoding() {
        let pde = PageDirectoryEntry::new(PhysAddr::new(0x5000), PageAttributes::PRESENT | PageAttributes::KERNEL);
        assert_eq!(pde.as_raw(), 0x5001);
        let attrs = pde.attributes();
        assert!(attrs.contains(PageAttributes::KERNEL | PageAttributes::READABLE | PageAttributes::EXECUTABLE));
        assert!(!attrs.contains(PageAttributes::WRITABLE));
    }

    #[test]
    fn test_not_present_is_invalid() {
        let pte = PageEntry::new(PhysAddr::new(0x5000), PageAttributes::WRITABLE);
        assert!(!pte.is_present());
        assert_eq!(pte.address(), None);
        assert_eq!(pte.attributes(), PageAttributes::NONE);
    }

    #[test]
    fn test_with_attributes_keeps_frame() {
        let pte = PageEntry::new(PhysAddr::new(0x7000), PageAttributes::PRESENT | PageAttributes::WRITABLE);
        let ro = pte.with_attributes(PageAttributes::PRESENT);
        assert_eq!(ro.address(), Some(PhysAddr::new(0x7000)));
        assert!(!ro.attributes().contains(PageAttributes::WRITABLE));
    }
}
