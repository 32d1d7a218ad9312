//! Page attributes
//!
//! The attribute set the VSpace manager requests for a mapping and the
//! table walk reports back. The i386 MMU cannot express every combination:
//! a present page is always readable and executable, so those two bits are
//! reported whenever [`PageAttributes::PRESENT`] is.

use core::fmt;
use core::ops::{BitAnd, BitOr, Not};

/// Hardware-visible attributes of one mapping.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct PageAttributes(u8);

impl PageAttributes {
    /// Mapping can be read.
    pub const READABLE: Self = Self(1 << 0);
    /// Mapping can be written.
    pub const WRITABLE: Self = Self(1 << 1);
    /// Mapping can be executed.
    pub const EXECUTABLE: Self = Self(1 << 2);
    /// Mapping is reachable from kernel mode only.
    pub const KERNEL: Self = Self(1 << 3);
    /// Mapping is present.
    pub const PRESENT: Self = Self(1 << 4);

    /// No attributes (not present).
    pub const NONE: Self = Self(0);

    /// Kernel-only read/write mapping, as used for the kernel half.
    pub const KERNEL_RW: Self =
        Self(Self::PRESENT.0 | Self::READABLE.0 | Self::WRITABLE.0 | Self::KERNEL.0);

    const ALL_BITS: u8 = 0x1F;

    /// Create from raw bits, discarding undefined ones.
    #[inline]
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Raw bit value.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bitwise union.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Bitwise intersection.
    #[inline]
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Check whether this describes a present mapping.
    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.contains(Self::PRESENT)
    }
}

impl BitOr for PageAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for PageAttributes {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl Not for PageAttributes {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL_BITS)
    }
}

impl fmt::Debug for PageAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in [
            (Self::PRESENT, "PRESENT"),
            (Self::READABLE, "READABLE"),
            (Self::WRITABLE, "WRITABLE"),
            (Self::EXECUTABLE, "EXECUTABLE"),
            (Self::KERNEL, "KERNEL"),
        ] {
            if self.contains(flag) {
                set.entry(&name);
            }
        }
        set.finish()
    }
}
