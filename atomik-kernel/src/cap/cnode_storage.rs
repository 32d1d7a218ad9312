//! CNode kernel storage
//!
//! CNode slot arrays live in a generational arena. A [`CNodeId`] names an
//! arena entry plus the generation it was created in, so a handle that
//! outlives its array stops resolving instead of aliasing whatever array
//! reuses the entry.
//!
//! This module implements the [`CSpaceStore`] trait from `atomik-cap`.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use atomik_cap::cnode::MAX_CNODE_RADIX;
use atomik_cap::{CNodeId, CSpaceStore, CapError, CapResult, CapSlot, SlotRef};

/// Maximum number of live slot arrays.
pub const MAX_CNODES: usize = 65536;

struct Entry {
    generation: u32,
    slots: Option<Box<[CapSlot]>>,
}

/// Arena of CNode slot arrays.
///
/// Index 0 is reserved so that [`CNodeId::NULL`] never resolves.
pub struct CNodeTable {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
    limit: usize,
}

impl CNodeTable {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::with_limit(MAX_CNODES)
    }

    /// Create an empty arena holding at most `limit` arrays.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: vec![Entry {
                generation: 0,
                slots: None,
            }],
            free: Vec::new(),
            live: 0,
            limit,
        }
    }

    /// Number of live slot arrays.
    pub fn live(&self) -> usize {
        self.live
    }

    fn array(&self, id: CNodeId) -> Option<&[CapSlot]> {
        let entry = self.entries.get(id.index() as usize)?;
        if id.is_null() || entry.generation != id.generation() {
            return None;
        }
        entry.slots.as_deref()
    }

    fn array_mut(&mut self, id: CNodeId) -> Option<&mut [CapSlot]> {
        if id.is_null() {
            return None;
        }
        let entry = self.entries.get_mut(id.index() as usize)?;
        if entry.generation != id.generation() {
            return None;
        }
        entry.slots.as_deref_mut()
    }
}

impl Default for CNodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CSpaceStore for CNodeTable {
    fn slot(&self, at: SlotRef) -> CapResult<&CapSlot> {
        self.array(at.cnode)
            .and_then(|slots| slots.get(at.index as usize))
            .ok_or(CapError::Range)
    }

    fn slot_mut(&mut self, at: SlotRef) -> CapResult<&mut CapSlot> {
        self.array_mut(at.cnode)
            .and_then(|slots| slots.get_mut(at.index as usize))
            .ok_or(CapError::Range)
    }

    fn create_cnode(&mut self, size_bits: u32) -> CapResult<CNodeId> {
        if size_bits > MAX_CNODE_RADIX {
            return Err(CapError::InvalidSize);
        }
        if self.live >= self.limit {
            log::warn!("cnode arena full ({} arrays)", self.live);
            return Err(CapError::NotEnoughMemory);
        }
        let slots = vec![CapSlot::empty(); 1 << size_bits].into_boxed_slice();

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    slots: None,
                });
                (self.entries.len() - 1) as u32
            }
        };
        let entry = &mut self.entries[index as usize];
        entry.generation = entry.generation.wrapping_add(1);
        entry.slots = Some(slots);
        self.live += 1;
        Ok(CNodeId::new(index, entry.generation))
    }

    fn destroy_cnode(&mut self, id: CNodeId) -> CapResult<()> {
        if self.array(id).is_none() {
            return Err(CapError::Range);
        }
        if !self.is_cnode_empty(id) {
            return Err(CapError::DeleteFirst);
        }
        self.entries[id.index() as usize].slots = None;
        self.free.push(id.index());
        self.live -= 1;
        Ok(())
    }

    fn cnode_len(&self, id: CNodeId) -> Option<usize> {
        self.array(id).map(<[CapSlot]>::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomik_cap::CapObject;
    use atomik_cap::objects::EndpointCap;
    use atomik_cap::CapRights;
    use atomik_common::PhysAddr;

    fn endpoint() -> CapObject {
        CapObject::Endpoint(EndpointCap::new(PhysAddr::new(0x0030_0000), CapRights::ALL))
    }

    #[test]
    fn test_create_and_access() {
        let mut table = CNodeTable::new();
        let id = table.create_cnode(4).unwrap();
        assert_eq!(table.cnode_len(id), Some(16));
        assert!(table.slot(SlotRef::new(id, 15)).unwrap().is_null());
        assert_eq!(table.slot(SlotRef::new(id, 16)), Err(CapError::Range));
        assert_eq!(table.slot(SlotRef::NULL), Err(CapError::Range));
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut table = CNodeTable::new();
        let old = table.create_cnode(2).unwrap();
        table.destroy_cnode(old).unwrap();
        let new = table.create_cnode(2).unwrap();

        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(table.slot(SlotRef::new(old, 0)), Err(CapError::Range));
        assert_eq!(table.destroy_cnode(old), Err(CapError::Range));
        assert_eq!(table.live(), 1);
    }

    #[test]
    fn test_destroy_requires_empty() {
        let mut table = CNodeTable::new();
        let id = table.create_cnode(1).unwrap();
        table.slot_mut(SlotRef::new(id, 1)).unwrap().object = endpoint();
        assert_eq!(table.destroy_cnode(id), Err(CapError::DeleteFirst));

        table.slot_mut(SlotRef::new(id, 1)).unwrap().clear();
        table.destroy_cnode(id).unwrap();
        assert_eq!(table.cnode_len(id), None);
    }

    #[test]
    fn test_limit() {
        let mut table = CNodeTable::with_limit(2);
        table.create_cnode(1).unwrap();
        let id = table.create_cnode(1).unwrap();
        assert_eq!(table.create_cnode(1), Err(CapError::NotEnoughMemory));
        table.destroy_cnode(id).unwrap();
        assert!(table.create_cnode(1).is_ok());
        assert_eq!(table.create_cnode(MAX_CNODE_RADIX + 1), Err(CapError::InvalidSize));
    }
}
