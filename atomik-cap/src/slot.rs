//! Capability slot storage
//!
//! A capability slot is the fundamental unit of capability storage. Each
//! slot holds exactly one capability (or is Null) together with its links
//! in the derivation tree.
//!
//! # Addressing
//!
//! Slots are never addressed by pointer. A [`SlotRef`] names a slot by the
//! CNode slot array that holds it ([`CNodeId`]) and its index inside that
//! array. `CNodeId` carries a generation so that a reference into a
//! destroyed slot array is detected instead of silently aliasing a new one.

use core::fmt;

use crate::objects::CapObject;
use crate::rights::CapRights;

/// Object type discriminant.
///
/// The discriminants double as syscall object classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ObjectType {
    /// Empty slot (no capability).
    #[default]
    Null = 0,
    /// Untyped memory.
    Untyped = 1,
    /// Capability node.
    CNode = 2,
    /// 4 KiB page frame.
    Page = 3,
    /// Second-level page table.
    PageTable = 4,
    /// Top-level page directory.
    PageDirectory = 5,
    /// Synchronous endpoint.
    Endpoint = 6,
    /// Asynchronous notification.
    Notification = 7,
    /// Thread control block.
    ThreadControlBlock = 8,
    /// Buddy-managed object pool.
    Pool = 9,
}

impl ObjectType {
    /// Decode a raw type number.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Null,
            1 => Self::Untyped,
            2 => Self::CNode,
            3 => Self::Page,
            4 => Self::PageTable,
            5 => Self::PageDirectory,
            6 => Self::Endpoint,
            7 => Self::Notification,
            8 => Self::ThreadControlBlock,
            9 => Self::Pool,
            _ => return None,
        })
    }

    /// Get the human-readable name for this object type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Untyped => "Untyped",
            Self::CNode => "CNode",
            Self::Page => "Page",
            Self::PageTable => "PageTable",
            Self::PageDirectory => "PageDirectory",
            Self::Endpoint => "Endpoint",
            Self::Notification => "Notification",
            Self::ThreadControlBlock => "TCB",
            Self::Pool => "Pool",
        }
    }

    /// Check if this is the empty type.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if objects of this type are manipulated by the kernel itself
    /// and must therefore live inside the remap window.
    #[inline]
    #[must_use]
    pub const fn needs_kernel_mapping(self) -> bool {
        matches!(
            self,
            Self::CNode
                | Self::PageTable
                | Self::PageDirectory
                | Self::Endpoint
                | Self::Notification
                | Self::ThreadControlBlock
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Handle of one CNode slot array.
///
/// # Null Reference
///
/// Index 0 is reserved, so `CNodeId::NULL` never names a live array.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct CNodeId {
    index: u32,
    generation: u32,
}

impl CNodeId {
    /// Null handle (no slot array).
    pub const NULL: Self = Self {
        index: 0,
        generation: 0,
    };

    /// Create a handle from its parts.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Table index of the slot array.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the handle was issued in.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Check if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == 0
    }
}

impl fmt::Debug for CNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "CNodeId::NULL")
        } else {
            write!(f, "CNodeId({}.{})", self.index, self.generation)
        }
    }
}

/// Reference to one capability slot.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct SlotRef {
    /// Slot array holding the slot.
    pub cnode: CNodeId,
    /// Index within the slot array.
    pub index: u32,
}

impl SlotRef {
    /// Null reference (no slot).
    pub const NULL: Self = Self {
        cnode: CNodeId::NULL,
        index: 0,
    };

    /// Create a slot reference.
    #[inline]
    #[must_use]
    pub const fn new(cnode: CNodeId, index: u32) -> Self {
        Self { cnode, index }
    }

    /// Check if this is the null reference.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.cnode.is_null()
    }

    /// Reference to the slot `offset` entries further on in the same array.
    #[inline]
    #[must_use]
    pub const fn offset(self, offset: u32) -> Self {
        Self {
            cnode: self.cnode,
            index: self.index + offset,
        }
    }
}

impl fmt::Debug for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "SlotRef::NULL")
        } else {
            write!(f, "SlotRef({}.{}[{}])", self.cnode.index, self.cnode.generation, self.index)
        }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "cnode#{}[{}]", self.cnode.index, self.index)
        }
    }
}

/// Derivation tree links of one slot.
///
/// - `parent`: the capability this one was derived from
/// - `child`: head of this slot's child list (most recent first)
/// - `prev` / `next`: neighbours in the parent's child list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CdtLinks {
    /// Capability this was derived from.
    pub parent: SlotRef,
    /// First child.
    pub child: SlotRef,
    /// Previous sibling.
    pub prev: SlotRef,
    /// Next sibling.
    pub next: SlotRef,
}

impl CdtLinks {
    /// No links.
    pub const EMPTY: Self = Self {
        parent: SlotRef::NULL,
        child: SlotRef::NULL,
        prev: SlotRef::NULL,
        next: SlotRef::NULL,
    };
}

/// Capability slot - stores a single capability.
///
/// # Invariants
///
/// - A Null slot has empty links
/// - `links.child` is non-null if and only if some slot names this one as
///   its parent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CapSlot {
    /// The capability payload.
    pub object: CapObject,
    /// Derivation tree links.
    pub links: CdtLinks,
}

impl CapSlot {
    /// Create an empty slot.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            object: CapObject::Null,
            links: CdtLinks::EMPTY,
        }
    }

    /// Check if the slot is empty.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self.object, CapObject::Null)
    }

    /// Get the capability type.
    #[inline]
    #[must_use]
    pub const fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    /// Get the access rights.
    #[inline]
    #[must_use]
    pub const fn rights(&self) -> CapRights {
        self.object.rights()
    }

    /// Check whether any capability was derived from this one.
    #[inline]
    #[must_use]
    pub const fn has_children(&self) -> bool {
        !self.links.child.is_null()
    }

    /// Clear the slot (make empty).
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::empty();
    }
}

impl fmt::Display for CapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "<null>")
        } else {
            write!(f, "{} [{}]", self.object, self.rights())
        }
    }
}
