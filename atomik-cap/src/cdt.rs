//! Capability Derivation Tree (CDT)
//!
//! The CDT tracks parent-child relationships between capabilities for
//! revocation. The links live in the slots themselves ([`CdtLinks`]), so
//! the tree needs no storage of its own.
//!
//! # Structure
//!
//! - Each slot names its parent
//! - Each parent names its first child
//! - Children are linked as a doubly-linked sibling list
//!
//! This structure allows:
//! - O(1) insertion (add to front of child list)
//! - O(1) removal (unlink from sibling list)
//! - O(n) revocation (traverse all descendants)
//!
//! # Derivation Rules
//!
//! - **Retype**: Creates a child of the Untyped capability
//! - **Pool alloc**: Creates a child of the Pool capability
//! - **Delete**: Only leaves can be deleted; the slot is unlinked
//! - **Revoke**: Deletes all descendants, bottom-up

use crate::cnode::CSpaceStore;
use crate::error::CapResult;
use crate::slot::{CdtLinks, SlotRef};

/// Derivation tree operations over any slot store.
///
/// Every method has a default implementation in terms of
/// [`CSpaceStore`]; a blanket implementation covers every store.
pub trait CdtOps: CSpaceStore {
    /// Get the links of a slot.
    ///
    /// # Errors
    ///
    /// `Range` if the slot does not exist.
    fn links(&self, at: SlotRef) -> CapResult<CdtLinks> {
        Ok(self.slot(at)?.links)
    }

    /// Insert `child` as the new head of `parent`'s child list.
    ///
    /// # Errors
    ///
    /// `Range` if either slot does not exist.
    fn add_child(&mut self, parent: SlotRef, child: SlotRef) -> CapResult<()> {
        let old_first = self.slot(parent)?.links.child;

        let links = &mut self.slot_mut(child)?.links;
        links.parent = parent;
        links.prev = SlotRef::NULL;
        links.next = old_first;

        if !old_first.is_null() {
            self.slot_mut(old_first)?.links.prev = child;
        }

        self.slot_mut(parent)?.links.child = child;
        Ok(())
    }

    /// Remove a slot from its parent's child list.
    ///
    /// The slot's own children are left untouched.
    ///
    /// # Errors
    ///
    /// `Range` if a linked slot does not exist.
    fn unlink(&mut self, at: SlotRef) -> CapResult<()> {
        let CdtLinks {
            parent, prev, next, ..
        } = self.links(at)?;

        if !prev.is_null() {
            self.slot_mut(prev)?.links.next = next;
        } else if !parent.is_null() {
            // First child: the parent's head moves on
            self.slot_mut(parent)?.links.child = next;
        }

        if !next.is_null() {
            self.slot_mut(next)?.links.prev = prev;
        }

        let links = &mut self.slot_mut(at)?.links;
        links.parent = SlotRef::NULL;
        links.prev = SlotRef::NULL;
        links.next = SlotRef::NULL;
        Ok(())
    }

    /// Number of direct children.
    ///
    /// # Errors
    ///
    /// `Range` if a linked slot does not exist.
    fn child_count(&self, at: SlotRef) -> CapResult<usize> {
        let mut count = 0;
        let mut child = self.links(at)?.child;
        while !child.is_null() {
            count += 1;
            child = self.links(child)?.next;
        }
        Ok(count)
    }

    /// Number of descendants at any depth.
    ///
    /// # Errors
    ///
    /// `Range` if a linked slot does not exist.
    fn count_descendants(&self, at: SlotRef) -> CapResult<usize> {
        let mut count = 0;
        let mut child = self.links(at)?.child;
        while !child.is_null() {
            count += 1 + self.count_descendants(child)?;
            child = self.links(child)?.next;
        }
        Ok(count)
    }

    /// Check the sibling list below `at` for consistency.
    ///
    /// Every child must name `at` as its parent, and `prev`/`next` must
    /// mirror each other.
    ///
    /// # Errors
    ///
    /// `Range` if a linked slot does not exist.
    fn children_consistent(&self, at: SlotRef) -> CapResult<bool> {
        let mut prev = SlotRef::NULL;
        let mut child = self.links(at)?.child;
        while !child.is_null() {
            let links = self.links(child)?;
            if links.parent != at || links.prev != prev {
                return Ok(false);
            }
            prev = child;
            child = links.next;
        }
        Ok(true)
    }
}

impl<S: CSpaceStore + ?Sized> CdtOps for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestStore;

    #[test]
    fn test_add_child_is_head_insert() {
        let mut store = TestStore::new();
        let cnode = store.create_cnode(4).unwrap();
        let parent = SlotRef::new(cnode, 0);
        let first = SlotRef::new(cnode, 1);
        let second = SlotRef::new(cnode, 2);

        store.add_child(parent, first).unwrap();
        store.add_child(parent, second).unwrap();

        assert_eq!(store.links(parent).unwrap().child, second);
        assert_eq!(store.links(second).unwrap().next, first);
        assert_eq!(store.links(first).unwrap().prev, second);
        assert_eq!(store.child_count(parent).unwrap(), 2);
        assert!(store.children_consistent(parent).unwrap());
    }

    #[test]
    fn test_unlink_middle_and_head() {
        let mut store = TestStore::new();
        let cnode = store.create_cnode(4).unwrap();
        let parent = SlotRef::new(cnode, 0);
        for index in 1..=3 {
            store.add_child(parent, SlotRef::new(cnode, index)).unwrap();
        }

        // List is 3, 2, 1
        store.unlink(SlotRef::new(cnode, 2)).unwrap();
        assert_eq!(store.links(SlotRef::new(cnode, 3)).unwrap().next, SlotRef::new(cnode, 1));
        assert!(store.children_consistent(parent).unwrap());

        store.unlink(SlotRef::new(cnode, 3)).unwrap();
        assert_eq!(store.links(parent).unwrap().child, SlotRef::new(cnode, 1));
        assert_eq!(store.links(SlotRef::new(cnode, 1)).unwrap().prev, SlotRef::NULL);

        store.unlink(SlotRef::new(cnode, 1)).unwrap();
        assert_eq!(store.child_count(parent).unwrap(), 0);
        assert_eq!(store.links(SlotRef::new(cnode, 1)).unwrap(), CdtLinks::EMPTY);
    }

    #[test]
    fn test_count_descendants() {
        let mut store = TestStore::new();
        let cnode = store.create_cnode(4).unwrap();
        let at = |index| SlotRef::new(cnode, index);
        store.add_child(at(0), at(1)).unwrap();
        store.add_child(at(0), at(2)).unwrap();
        store.add_child(at(1), at(3)).unwrap();
        store.add_child(at(3), at(4)).unwrap();
        assert_eq!(store.count_descendants(at(0)).unwrap(), 4);
        assert_eq!(store.count_descendants(at(1)).unwrap(), 2);
    }
}
