//! Capability pointer resolution
//!
//! A capability pointer (CPtr) is a 32-bit string consumed from the most
//! significant end. Each CNode on the path consumes its guard and then its
//! index:
//!
//! ```text
//! CPtr: | guard (guard_bits) | index (size_bits) | next level ... |
//!       ^ MSB
//! ```
//!
//! # Depth
//!
//! An explicit depth is the number of bits the caller wants resolved;
//! the walk must end exactly on a level boundary. [`FULL_DEPTH`] instead
//! descends through CNodes for as long as pointer bits remain and stops
//! at the first non-CNode slot. A depth of zero names the root itself.

use core::fmt;

use crate::cnode::{CPTR_BITS, CSpaceStore, FULL_DEPTH};
use crate::error::{CapError, CapResult};
use crate::objects::{CNodeCap, CapObject};
use crate::slot::SlotRef;

/// Resolution failure with diagnostic context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupFault {
    /// The root slot does not hold a CNode.
    InvalidRoot,
    /// A slot on the path is empty.
    MissingCapability {
        /// Pointer bits left unresolved.
        bits_left: u32,
    },
    /// The requested depth does not end on a level boundary.
    DepthMismatch {
        /// Pointer bits left unresolved.
        bits_left: u32,
        /// Bits the failing level would have consumed.
        bits_resolved: u32,
    },
    /// Pointer bits do not match a CNode guard.
    GuardMismatch {
        /// Pointer bits left unresolved.
        bits_left: u32,
        /// Guard of the failing CNode.
        guard: u32,
        /// Guard width of the failing CNode.
        guard_bits: u32,
    },
}

impl fmt::Display for LookupFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRoot => write!(f, "invalid root"),
            Self::MissingCapability { bits_left } => {
                write!(f, "missing capability ({bits_left} bits left)")
            }
            Self::DepthMismatch {
                bits_left,
                bits_resolved,
            } => write!(f, "depth mismatch ({bits_left} bits left, level takes {bits_resolved})"),
            Self::GuardMismatch {
                bits_left,
                guard,
                guard_bits,
            } => write!(
                f,
                "guard mismatch ({bits_left} bits left, expected {guard:#x}/{guard_bits})"
            ),
        }
    }
}

impl From<LookupFault> for CapError {
    fn from(fault: LookupFault) -> Self {
        match fault {
            LookupFault::InvalidRoot => Self::InvalidCapability,
            LookupFault::MissingCapability { .. }
            | LookupFault::DepthMismatch { .. }
            | LookupFault::GuardMismatch { .. } => Self::FailedLookup,
        }
    }
}

/// Top `bits` bits of `cursor`.
#[inline]
const fn take_bits(cursor: u32, bits: u32) -> u32 {
    ((cursor as u64) >> (CPTR_BITS - bits)) as u32
}

/// Resolve `addr` against the CSpace rooted at `root`.
///
/// The loop consumes at least one bit per level, so it runs at most
/// [`CPTR_BITS`] times regardless of how the CNodes are linked.
///
/// # Errors
///
/// See [`LookupFault`].
pub fn resolve<S: CSpaceStore + ?Sized>(
    cs: &S,
    root: SlotRef,
    addr: u32,
    depth: u8,
) -> Result<SlotRef, LookupFault> {
    if depth == 0 {
        return Ok(root);
    }

    let full = depth == FULL_DEPTH;
    let mut depth_left = if full { CPTR_BITS } else { u32::from(depth) };
    if depth_left > CPTR_BITS {
        return Err(LookupFault::DepthMismatch {
            bits_left: CPTR_BITS,
            bits_resolved: depth_left,
        });
    }

    let mut node: CNodeCap = match cs.object(root) {
        Ok(CapObject::CNode(cnode)) => cnode,
        _ => return Err(LookupFault::InvalidRoot),
    };
    let mut cursor = addr;
    let mut bits_left = CPTR_BITS;

    for _ in 0..CPTR_BITS {
        let bits = node.bits_resolved();

        if !full && node.guard_bits > depth_left {
            return Err(LookupFault::GuardMismatch {
                bits_left,
                guard: node.guard,
                guard_bits: node.guard_bits,
            });
        }
        if bits > bits_left || bits > depth_left {
            return Err(LookupFault::DepthMismatch {
                bits_left,
                bits_resolved: bits,
            });
        }

        let entry = take_bits(cursor, bits);
        let index = entry & ((1 << node.size_bits) - 1);
        if entry >> node.size_bits != node.guard {
            return Err(LookupFault::GuardMismatch {
                bits_left,
                guard: node.guard,
                guard_bits: node.guard_bits,
            });
        }

        let slot = SlotRef::new(node.storage, index);
        cursor = ((cursor as u64) << bits) as u32;
        bits_left -= bits;
        depth_left -= bits;
        log::trace!("cspace: {addr:#010x} -> {slot} ({bits_left} bits left)");

        let object = cs
            .object(slot)
            .map_err(|_| LookupFault::MissingCapability { bits_left })?;

        if !full && depth_left == 0 {
            return Ok(slot);
        }

        match object {
            CapObject::Null => return Err(LookupFault::MissingCapability { bits_left }),
            CapObject::CNode(next) if bits_left > 0 => node = next,
            _ if full => return Ok(slot),
            _ => {
                return Err(LookupFault::DepthMismatch {
                    bits_left,
                    bits_resolved: bits,
                });
            }
        }
    }

    Err(LookupFault::DepthMismatch {
        bits_left,
        bits_resolved: 0,
    })
}

/// [`resolve`] with the fault folded into a [`CapError`].
///
/// # Errors
///
/// `FailedLookup`, or `InvalidCapability` if `root` is not a CNode.
pub fn lookup<S: CSpaceStore + ?Sized>(cs: &S, root: SlotRef, addr: u32, depth: u8) -> CapResult<SlotRef> {
    resolve(cs, root, addr, depth).map_err(|fault| {
        log::debug!("lookup of {addr:#010x} (depth {depth}) failed: {fault}");
        CapError::from(fault)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::UntypedCap;
    use crate::rights::CapRights;
    use crate::testing::TestStore;
    use atomik_common::PhysAddr;

    /// Root CNode of 256 entries guarded by 0xA/4, installed in a
    /// one-entry holder array.
    fn guarded_root(store: &mut TestStore) -> SlotRef {
        let holder = store.create_cnode(1).unwrap();
        let array = store.create_cnode(8).unwrap();
        let mut cap = CNodeCap::new(PhysAddr::new(0x0020_0000), array, 8, CapRights::ALL);
        cap.set_guard(0xA, 4).unwrap();
        let root = SlotRef::new(holder, 0);
        store.slot_mut(root).unwrap().object = CapObject::CNode(cap);
        root
    }

    fn put_untyped(store: &mut TestStore, at: SlotRef) {
        store.slot_mut(at).unwrap().object =
            CapObject::Untyped(UntypedCap::new(PhysAddr::new(0x0030_0000), 12, CapRights::ALL));
    }

    #[test]
    fn test_zero_depth_is_root() {
        let mut store = TestStore::new();
        let root = guarded_root(&mut store);
        assert_eq!(resolve(&store, root, 0xDEAD_BEEF, 0), Ok(root));
    }

    #[test]
    fn test_guarded_entry() {
        let mut store = TestStore::new();
        let root = guarded_root(&mut store);
        let array = store.cnode_cap(root).unwrap().storage;
        assert_eq!(resolve(&store, root, 0xA000_0000, 12), Ok(SlotRef::new(array, 0)));
        assert_eq!(resolve(&store, root, 0xA010_0000, 12), Ok(SlotRef::new(array, 1)));
    }

    #[test]
    fn test_guard_mismatch() {
        let mut store = TestStore::new();
        let root = guarded_root(&mut store);
        assert_eq!(
            resolve(&store, root, 0xB010_0000, 12),
            Err(LookupFault::GuardMismatch {
                bits_left: 32,
                guard: 0xA,
                guard_bits: 4
            })
        );
        // Depth shorter than the guard itself
        assert!(matches!(
            resolve(&store, root, 0xA010_0000, 3),
            Err(LookupFault::GuardMismatch { .. })
        ));
    }

    #[test]
    fn test_depth_mismatch() {
        let mut store = TestStore::new();
        let root = guarded_root(&mut store);
        assert!(matches!(
            resolve(&store, root, 0xA010_0000, 8),
            Err(LookupFault::DepthMismatch { .. })
        ));
        let array = store.cnode_cap(root).unwrap().storage;
        put_untyped(&mut store, SlotRef::new(array, 1));
        // A leaf reached with depth still to go
        assert_eq!(
            resolve(&store, root, 0xA010_0000, 20),
            Err(LookupFault::DepthMismatch {
                bits_left: 20,
                bits_resolved: 12
            })
        );
    }

    #[test]
    fn test_full_depth_stops_at_leaf() {
        let mut store = TestStore::new();
        let root = guarded_root(&mut store);
        let array = store.cnode_cap(root).unwrap().storage;
        put_untyped(&mut store, SlotRef::new(array, 3));
        assert_eq!(resolve(&store, root, 0xA030_0000, FULL_DEPTH), Ok(SlotRef::new(array, 3)));
        assert_eq!(
            resolve(&store, root, 0xA040_0000, FULL_DEPTH),
            Err(LookupFault::MissingCapability { bits_left: 20 })
        );
    }

    #[test]
    fn test_nested_cnode() {
        let mut store = TestStore::new();
        let root = guarded_root(&mut store);
        let array = store.cnode_cap(root).unwrap().storage;

        // Second level: 16 entries, 16-bit zero guard, consuming the rest
        let inner = store.create_cnode(4).unwrap();
        let mut cap = CNodeCap::new(PhysAddr::new(0x0020_1000), inner, 4, CapRights::ALL);
        cap.set_guard(0, 16).unwrap();
        store.slot_mut(SlotRef::new(array, 2)).unwrap().object = CapObject::CNode(cap);
        put_untyped(&mut store, SlotRef::new(inner, 5));

        let addr = 0xA020_0005;
        assert_eq!(resolve(&store, root, addr, FULL_DEPTH), Ok(SlotRef::new(inner, 5)));
        assert_eq!(resolve(&store, root, addr, 32), Ok(SlotRef::new(inner, 5)));
        // Stopping at the first level names the CNode slot itself
        assert_eq!(resolve(&store, root, addr, 12), Ok(SlotRef::new(array, 2)));
        assert!(matches!(
            resolve(&store, root, 0xA020_1005, FULL_DEPTH),
            Err(LookupFault::GuardMismatch { guard_bits: 16, .. })
        ));
    }

    #[test]
    fn test_invalid_root() {
        let mut store = TestStore::new();
        let holder = store.create_cnode(1).unwrap();
        let root = SlotRef::new(holder, 0);
        assert_eq!(resolve(&store, root, 0, 8), Err(LookupFault::InvalidRoot));
        assert_eq!(lookup(&store, root, 0, 8), Err(CapError::InvalidCapability));
    }
}
