//! In-memory stores for unit tests.

use alloc::vec;
use alloc::vec::Vec;

use atomik_common::boot::KERNEL_BASE;
use atomik_common::{PhysAddr, PhysMemory, SparseMemory, VirtAddr};
use atomik_paging::PageAttributes;
use atomik_paging::arch::i386::{PageDirectory, PageDirectoryEntry, PageTableEntry, PgTable};

use crate::cnode::CSpaceStore;
use crate::error::{CapError, CapResult};
use crate::memory::{BoundSpace, ObjectMemory, ThreadBinding};
use crate::slot::{CNodeId, CapSlot, SlotRef};

struct Entry {
    generation: u32,
    slots: Option<Vec<CapSlot>>,
}

/// Vector-backed slot arrays.
pub struct TestStore {
    entries: Vec<Entry>,
}

impl TestStore {
    pub fn new() -> Self {
        // Index 0 is the null handle
        Self {
            entries: vec![Entry {
                generation: 0,
                slots: None,
            }],
        }
    }

    fn live(&self, id: CNodeId) -> Option<&Vec<CapSlot>> {
        let entry = self.entries.get(id.index() as usize)?;
        if entry.generation != id.generation() {
            return None;
        }
        entry.slots.as_ref()
    }
}

impl CSpaceStore for TestStore {
    fn slot(&self, at: SlotRef) -> CapResult<&CapSlot> {
        self.live(at.cnode)
            .and_then(|slots| slots.get(at.index as usize))
            .ok_or(CapError::Range)
    }

    fn slot_mut(&mut self, at: SlotRef) -> CapResult<&mut CapSlot> {
        let entry = self
            .entries
            .get_mut(at.cnode.index() as usize)
            .filter(|entry| entry.generation == at.cnode.generation())
            .ok_or(CapError::Range)?;
        entry
            .slots
            .as_mut()
            .and_then(|slots| slots.get_mut(at.index as usize))
            .ok_or(CapError::Range)
    }

    fn create_cnode(&mut self, size_bits: u32) -> CapResult<CNodeId> {
        let slots = vec![CapSlot::empty(); 1 << size_bits];
        self.entries.push(Entry {
            generation: 1,
            slots: Some(slots),
        });
        Ok(CNodeId::new(self.entries.len() as u32 - 1, 1))
    }

    fn destroy_cnode(&mut self, id: CNodeId) -> CapResult<()> {
        if self.live(id).is_none() {
            return Err(CapError::Range);
        }
        if !self.is_cnode_empty(id) {
            return Err(CapError::DeleteFirst);
        }
        let entry = &mut self.entries[id.index() as usize];
        entry.slots = None;
        entry.generation += 1;
        Ok(())
    }

    fn cnode_len(&self, id: CNodeId) -> Option<usize> {
        self.live(id).map(Vec::len)
    }
}

/// Boot directory used by [`TestMemory`].
pub const TEST_KERNEL_PD: PhysAddr = PhysAddr::new(0x0000_1000);

/// Kernel page table referenced by the boot directory.
pub const TEST_KERNEL_PT: PhysAddr = PhysAddr::new(0x0000_2000);

/// Sparse memory with a remap limit and recorded kernel callbacks.
pub struct TestMemory {
    pub memory: SparseMemory,
    pub remap_end: u64,
    pub invalidations: Vec<VirtAddr>,
    pub threads: Vec<PhysAddr>,
    pub released: Vec<PhysAddr>,
    pub detached: Vec<(PhysAddr, BoundSpace)>,
    pub binding: ThreadBinding,
}

impl TestMemory {
    pub fn new() -> Self {
        let mut memory = SparseMemory::new();
        PageDirectory::from_pa(TEST_KERNEL_PD).set_desc(
            &mut memory,
            VirtAddr::new(KERNEL_BASE),
            PageDirectoryEntry::new(TEST_KERNEL_PT, PageAttributes::KERNEL_RW),
        );
        Self {
            memory,
            remap_end: 0x0100_0000,
            invalidations: Vec::new(),
            threads: Vec::new(),
            released: Vec::new(),
            detached: Vec::new(),
            binding: ThreadBinding::default(),
        }
    }
}

impl PhysMemory for TestMemory {
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
        self.memory.read_bytes(addr, buf);
    }

    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
        self.memory.write_bytes(addr, data);
    }

    fn zero(&mut self, addr: PhysAddr, len: u64) {
        self.memory.zero(addr, len);
    }
}

impl ObjectMemory for TestMemory {
    fn is_remappable(&self, base: PhysAddr, size: u64) -> bool {
        base.as_u64() + size <= self.remap_end
    }

    fn kernel_directory(&self) -> PhysAddr {
        TEST_KERNEL_PD
    }

    fn invalidate_page(&mut self, vaddr: VirtAddr) {
        self.invalidations.push(vaddr);
    }

    fn create_thread(&mut self, tcb: PhysAddr) {
        self.threads.push(tcb);
    }

    fn release_thread(&mut self, tcb: PhysAddr) -> ThreadBinding {
        self.released.push(tcb);
        core::mem::take(&mut self.binding)
    }

    fn detach_thread(&mut self, tcb: PhysAddr, space: BoundSpace) {
        self.detached.push((tcb, space));
    }
}

/// Fill slot `index` of `cnode` with a root Untyped capability.
pub fn root_untyped(store: &mut TestStore, cnode: CNodeId, index: u32, base: u64, size_bits: u32) -> SlotRef {
    use crate::objects::{CapObject, UntypedCap};
    use crate::rights::CapRights;

    let at = SlotRef::new(cnode, index);
    store.slot_mut(at).unwrap().object =
        CapObject::Untyped(UntypedCap::new(PhysAddr::new(base), size_bits, CapRights::ALL));
    at
}
