//! Helpers for kernel unit tests.

use atomik_cap::objects::untyped;
use atomik_cap::{CSpaceStore, CapObject, ObjectType, SlotRef};

use crate::memory::MachineConfig;
use crate::state::KernelState;

/// A kernel booted on the default machine.
pub fn booted() -> KernelState {
    KernelState::new(&MachineConfig::default())
}

/// The largest root Untyped that lies entirely inside the remap window.
pub fn scratch_untyped(state: &KernelState) -> SlotRef {
    (0..state.untyped_count)
        .map(|index| state.cspace.cnode_slot(state.root, index).unwrap())
        .filter_map(|at| match state.cspace.object(at).unwrap() {
            CapObject::Untyped(ut) if state.machine.arena.is_remappable(ut.base, ut.size()) => {
                Some((ut.size_bits, at))
            }
            _ => None,
        })
        .max_by_key(|&(size_bits, _)| size_bits)
        .map(|(_, at)| at)
        .unwrap()
}

/// The first empty root slot past the boot Untyped capabilities.
pub fn free_root_slot(state: &KernelState) -> SlotRef {
    let cnode = state.cspace.cnode_cap(state.root).unwrap();
    (state.untyped_count..cnode.num_slots() as u32)
        .map(|index| state.cspace.cnode_slot(state.root, index).unwrap())
        .find(|&at| state.cspace.slot(at).unwrap().is_null())
        .unwrap()
}

/// Retype one object per request out of the scratch Untyped, each into
/// its own free root slot.
pub fn alloc_objects<const N: usize>(
    state: &mut KernelState,
    requests: &[(ObjectType, u32); N],
) -> [SlotRef; N] {
    let ut = scratch_untyped(state);
    requests.map(|(ty, size_bits)| {
        let at = free_root_slot(state);
        untyped::retype(&mut state.cspace, &mut state.machine, ut, ty, size_bits, &[at]).unwrap();
        at
    })
}
