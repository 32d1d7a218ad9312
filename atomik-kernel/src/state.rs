//! Kernel state
//!
//! Everything the kernel mutates lives in one [`KernelState`]: the CNode
//! arena, the machine (memory, MMU, threads) and the boot root slot.
//! Kernel entry is single-threaded and runs to completion, so operations
//! take `&mut KernelState` and need no further locking.

use atomik_cap::{CapResult, SlotRef, lookup};

use crate::cap::{CNodeTable, capabilities_init};
use crate::machine::Machine;
use crate::memory::{MachineConfig, PhysArena};

/// The kernel's single execution context.
pub struct KernelState {
    /// CNode slot arrays.
    pub cspace: CNodeTable,
    /// Memory, MMU and threads.
    pub machine: Machine,
    /// Kernel slot holding the root CNode capability.
    pub root: SlotRef,
    /// Root Untyped capabilities occupy root slots `0..untyped_count`.
    pub untyped_count: u32,
    /// Set by `d_halt`.
    pub halted: bool,
}

impl KernelState {
    /// Boot a kernel on `config`: build the boot page tables, then seed
    /// the root CNode with Untyped capabilities over free memory.
    ///
    /// # Panics
    ///
    /// An unusable memory layout or running out of boot table space is
    /// fatal.
    pub fn new(config: &MachineConfig) -> Self {
        let Some(boot) = config.boot_memory() else {
            log::error!("boot: unusable memory layout {:?}", config);
            panic!("unusable memory layout");
        };
        let machine = match Machine::boot(config, PhysArena::new(boot)) {
            Ok(machine) => machine,
            Err(err) => {
                log::error!("boot: page tables: {}", err);
                panic!("cannot build boot page tables: {err}");
            }
        };
        let mut cspace = CNodeTable::new();
        let caps = match capabilities_init(&mut cspace, &boot) {
            Ok(caps) => caps,
            Err(err) => {
                log::error!("boot: capabilities: {}", err);
                panic!("cannot create boot capabilities: {err}");
            }
        };
        Self {
            cspace,
            machine,
            root: caps.root,
            untyped_count: caps.untyped_count,
            halted: false,
        }
    }

    /// CSpace root of the calling thread, or the kernel root when no
    /// thread (or one without a CSpace) is running.
    #[must_use]
    pub fn caller_root(&self) -> SlotRef {
        self.machine
            .threads
            .current()
            .and_then(|tcb| self.machine.threads.get(tcb))
            .map(|thread| thread.cspace)
            .filter(|cspace| !cspace.is_null())
            .unwrap_or(self.root)
    }

    /// Resolve a capability pointer in the caller's CSpace.
    ///
    /// # Errors
    ///
    /// `FailedLookup` or `InvalidCapability`, see [`atomik_cap::lookup`].
    pub fn lookup(&self, cptr: u32, depth: u8) -> CapResult<SlotRef> {
        lookup(&self.cspace, self.caller_root(), cptr, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{alloc_objects, booted};
    use atomik_cap::{CSpaceStore, ObjectType};

    #[test]
    fn test_boot_root_lookup() {
        let state = booted();
        assert_eq!(state.caller_root(), state.root);
        let first = state.cspace.cnode_slot(state.root, 1).unwrap();
        assert_eq!(state.lookup(0xA010_0000, 12), Ok(first));
    }

    #[test]
    fn test_caller_root_follows_thread() {
        let mut state = booted();
        let [tcb, ep, cnode, pd] = alloc_objects(
            &mut state,
            &[
                (ObjectType::ThreadControlBlock, 0),
                (ObjectType::Endpoint, 0),
                (ObjectType::CNode, 4),
                (ObjectType::PageDirectory, 0),
            ],
        );
        crate::task::configure(&mut state.cspace, &mut state.machine.threads, tcb, ep, cnode, pd, 0)
            .unwrap();
        let base = state.cspace.object(tcb).unwrap().base();
        state.machine.threads.push(base).unwrap();
        assert_eq!(state.caller_root(), cnode);
    }
}
