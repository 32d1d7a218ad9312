//! Capability access rights
//!
//! Rights are orthogonal bits and can only be narrowed once a capability
//! exists. Interpretation is object-type specific:
//!
//! - **Execute**, **Write**, **Read**: page and table mapping attributes
//! - **Grant**: transfer capabilities through an endpoint
//! - **Remap**: change the attributes of an existing mapping

use core::fmt;

use atomik_paging::PageAttributes;

/// Access rights for capabilities.
///
/// # Layout
///
/// - Bit 0: Execute
/// - Bit 1: Write
/// - Bit 2: Read
/// - Bit 3: Grant
/// - Bit 4: Remap
/// - Bits 5-7: Reserved (must be zero)
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(transparent)]
pub struct CapRights(u8);

impl CapRights {
    /// No rights.
    pub const NONE: Self = Self(0);

    /// Execute permission.
    pub const EXEC: Self = Self(1 << 0);

    /// Write permission.
    pub const WRITE: Self = Self(1 << 1);

    /// Read permission.
    pub const READ: Self = Self(1 << 2);

    /// Grant permission.
    pub const GRANT: Self = Self(1 << 3);

    /// Remap permission.
    ///
    /// Required to change mapping attributes after the fact.
    pub const REMAP: Self = Self(1 << 4);

    /// All rights.
    pub const ALL: Self = Self(0x1F);

    /// Read and Write rights.
    pub const RW: Self = Self(Self::READ.0 | Self::WRITE.0);

    /// Create rights from raw bits.
    ///
    /// Only the lower 5 bits are used; upper bits are masked off.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Get the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check if these rights contain all the specified rights.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Intersect rights (logical AND).
    #[inline]
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Union rights (logical OR).
    ///
    /// Only used when a capability is first created.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Rights of `self` with every bit of `other` cleared.
    #[inline]
    #[must_use]
    pub const fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Check if no rights are set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// User mapping attributes granted by these rights.
    ///
    /// Mappings are always installed present; read, execute and write add
    /// their attribute bits.
    #[must_use]
    pub fn page_attributes(self) -> PageAttributes {
        let mut attrs = PageAttributes::PRESENT;
        if self.contains(Self::EXEC) {
            attrs = attrs | PageAttributes::EXECUTABLE;
        }
        if self.contains(Self::READ) {
            attrs = attrs | PageAttributes::READABLE;
        }
        if self.contains(Self::WRITE) {
            attrs = attrs | PageAttributes::WRITABLE;
        }
        attrs
    }

    /// Attributes a caller needs in order to perform these accesses.
    #[must_use]
    pub fn required_attributes(self) -> PageAttributes {
        let mut attrs = PageAttributes::PRESENT;
        if self.contains(Self::READ) {
            attrs = attrs | PageAttributes::READABLE;
        }
        if self.contains(Self::EXEC) {
            attrs = attrs | PageAttributes::EXECUTABLE;
        }
        if self.contains(Self::WRITE) {
            attrs = attrs | PageAttributes::WRITABLE;
        }
        attrs
    }
}

impl fmt::Debug for CapRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_set();
        for (flag, name) in [
            (Self::EXEC, "Exec"),
            (Self::WRITE, "Write"),
            (Self::READ, "Read"),
            (Self::GRANT, "Grant"),
            (Self::REMAP, "Remap"),
        ] {
            if self.contains(flag) {
                list.entry(&name);
            }
        }
        list.finish()
    }
}

impl fmt::Display for CapRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            if self.contains(Self::READ) { "R" } else { "-" },
            if self.contains(Self::WRITE) { "W" } else { "-" },
            if self.contains(Self::EXEC) { "X" } else { "-" },
            if self.contains(Self::GRANT) { "G" } else { "-" },
            if self.contains(Self::REMAP) { "M" } else { "-" },
        )
    }
}

impl core::ops::BitAnd for CapRights {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersect(rhs)
    }
}

impl core::ops::BitOr for CapRights {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}
