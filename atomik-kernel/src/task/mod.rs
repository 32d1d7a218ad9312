//! Thread management for the kernel
//!
//! A thread exists for as long as a TCB object does and is named by the
//! physical base of that object. The capability core tells the kernel
//! about creation and destruction through
//! [`ObjectMemory`](atomik_cap::ObjectMemory); everything else about a
//! thread (registers, priority, bound spaces, scheduling) lives here.

extern crate alloc;

use alloc::collections::BTreeMap;

use atomik_cap::{BoundSpace, CSpaceStore, CapError, CapObject, CapResult, SlotRef, ThreadBinding};
use atomik_common::PhysAddr;
use atomik_syscall::{Register, SyscallFrame};

use crate::sched::RunQueue;

// -- Thread state

/// Thread execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Created or pulled from the run queue.
    #[default]
    Inactive,
    /// On the run queue.
    Running,
    /// Waiting to send on an endpoint.
    BlockedOnSend,
    /// Waiting for a call to be answered.
    BlockedOnCall,
    /// Waiting to receive on an endpoint.
    BlockedOnRecv,
    /// The idle thread.
    Idle,
}

/// Saved user register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: u32,
}

impl Registers {
    /// The registers taking part in a syscall.
    #[must_use]
    pub const fn frame(&self) -> SyscallFrame {
        SyscallFrame {
            regs: [self.eax, self.ebx, self.ecx, self.edx, self.esi, self.edi],
        }
    }

    /// Write back the registers a syscall returned in.
    pub const fn set_frame(&mut self, frame: &SyscallFrame) {
        self.eax = frame.get(Register::Eax);
        self.ebx = frame.get(Register::Ebx);
        self.ecx = frame.get(Register::Ecx);
        self.edx = frame.get(Register::Edx);
        self.esi = frame.get(Register::Esi);
        self.edi = frame.get(Register::Edi);
    }
}

/// Per-thread kernel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Thread {
    /// Execution state.
    pub state: ThreadState,
    /// Scheduling priority.
    pub priority: u8,
    /// Slot of the CSpace root capability.
    pub cspace: SlotRef,
    /// Slot of the VSpace root capability.
    pub vspace: SlotRef,
    /// Slot of the fault endpoint capability.
    pub fault_ep: SlotRef,
    /// Saved registers.
    pub regs: Registers,
}

// -- Thread table

/// All threads plus the run queue.
#[derive(Debug, Default)]
pub struct Threads {
    pub(crate) table: BTreeMap<PhysAddr, Thread>,
    pub(crate) run_queue: RunQueue,
    pub(crate) current: Option<PhysAddr>,
}

impl Threads {
    /// Create an empty thread table with the idle thread current.
    pub const fn new() -> Self {
        Self {
            table: BTreeMap::new(),
            run_queue: RunQueue::new(),
            current: None,
        }
    }

    /// Number of live threads.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check whether there are no threads.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Look up a thread.
    pub fn get(&self, tcb: PhysAddr) -> Option<&Thread> {
        self.table.get(&tcb)
    }

    /// Look up a thread for modification.
    pub fn get_mut(&mut self, tcb: PhysAddr) -> Option<&mut Thread> {
        self.table.get_mut(&tcb)
    }

    /// Register a fresh thread for a new TCB object.
    pub fn create(&mut self, tcb: PhysAddr) {
        if self.table.insert(tcb, Thread::default()).is_some() {
            log::warn!("thread {} recreated over a live thread", tcb);
        }
    }

    /// Forget a thread, taking it off the run queue first.
    ///
    /// Returns the spaces it was bound to.
    pub fn release(&mut self, tcb: PhysAddr) -> ThreadBinding {
        if self.run_queue.contains(tcb) {
            self.dequeue(tcb);
        }
        match self.table.remove(&tcb) {
            Some(thread) => ThreadBinding {
                cspace: thread.cspace,
                vspace: thread.vspace,
            },
            None => ThreadBinding::default(),
        }
    }

    /// Clear a thread's reference to a space that is being deleted.
    pub fn detach(&mut self, tcb: PhysAddr, space: BoundSpace) {
        if let Some(thread) = self.table.get_mut(&tcb) {
            match space {
                BoundSpace::CSpace => thread.cspace = SlotRef::NULL,
                BoundSpace::VSpace => thread.vspace = SlotRef::NULL,
            }
        }
    }
}

// -- TCB operations

fn tcb_base<S: CSpaceStore + ?Sized>(cs: &S, at: SlotRef) -> CapResult<PhysAddr> {
    match cs.object(at)? {
        CapObject::Tcb(tcb) => Ok(tcb.base),
        _ => Err(CapError::InvalidCapability),
    }
}

/// Bind the thread in `tcb_at` to a fault endpoint, CSpace root and
/// VSpace root, and set its priority.
///
/// A thread that was configured before is unbound from its old roots.
///
/// # Errors
///
/// - `InvalidCapability`: any slot holds the wrong object type
/// - `AlreadyBound`: the CNode or PageDirectory belongs to another thread
pub fn configure<S: CSpaceStore + ?Sized>(
    cs: &mut S,
    threads: &mut Threads,
    tcb_at: SlotRef,
    fault_ep_at: SlotRef,
    croot_at: SlotRef,
    vroot_at: SlotRef,
    priority: u8,
) -> CapResult<()> {
    let tcb = tcb_base(&*cs, tcb_at)?;
    let (CapObject::Endpoint(_), CapObject::CNode(croot), CapObject::PageDirectory(vroot)) =
        (cs.object(fault_ep_at)?, cs.object(croot_at)?, cs.object(vroot_at)?)
    else {
        return Err(CapError::InvalidCapability);
    };
    if croot.tcb.is_some_and(|owner| owner != tcb) || vroot.tcb.is_some_and(|owner| owner != tcb) {
        return Err(CapError::AlreadyBound);
    }
    let thread = threads.get_mut(tcb).ok_or(CapError::InvalidCapability)?;

    let old = (thread.cspace, thread.vspace);
    thread.cspace = croot_at;
    thread.vspace = vroot_at;
    thread.fault_ep = fault_ep_at;
    thread.priority = priority;

    for at in [old.0, old.1] {
        if at.is_null() || at == croot_at || at == vroot_at {
            continue;
        }
        if let Ok(slot) = cs.slot_mut(at) {
            match &mut slot.object {
                CapObject::CNode(cnode) if cnode.tcb == Some(tcb) => cnode.tcb = None,
                CapObject::PageDirectory(pd) if pd.tcb == Some(tcb) => pd.tcb = None,
                _ => {}
            }
        }
    }
    if let CapObject::CNode(cnode) = &mut cs.slot_mut(croot_at)?.object {
        cnode.tcb = Some(tcb);
    }
    if let CapObject::PageDirectory(pd) = &mut cs.slot_mut(vroot_at)?.object {
        pd.tcb = Some(tcb);
    }

    log::debug!("tcb {}: cspace {}, vspace {}, prio {}", tcb, croot_at, vroot_at, priority);
    Ok(())
}

/// Replace the saved register file of the thread in `tcb_at`.
///
/// # Errors
///
/// `InvalidCapability` if the slot does not hold a TCB.
pub fn set_regs<S: CSpaceStore + ?Sized>(
    cs: &S,
    threads: &mut Threads,
    tcb_at: SlotRef,
    regs: &Registers,
) -> CapResult<()> {
    let tcb = tcb_base(cs, tcb_at)?;
    let thread = threads.get_mut(tcb).ok_or(CapError::InvalidCapability)?;
    thread.regs = *regs;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::KernelState;
    use crate::testutil::{alloc_objects, booted};
    use atomik_cap::ObjectType;

    struct Parts {
        tcb: SlotRef,
        ep: SlotRef,
        cnode: SlotRef,
        pd: SlotRef,
    }

    fn parts(state: &mut KernelState) -> Parts {
        let [tcb, ep, cnode, pd] = alloc_objects(
            state,
            &[
                (ObjectType::ThreadControlBlock, 0),
                (ObjectType::Endpoint, 0),
                (ObjectType::CNode, 4),
                (ObjectType::PageDirectory, 0),
            ],
        );
        Parts { tcb, ep, cnode, pd }
    }

    #[test]
    fn test_configure_binds_both_ways() {
        let mut state = booted();
        let p = parts(&mut state);
        configure(&mut state.cspace, &mut state.machine.threads, p.tcb, p.ep, p.cnode, p.pd, 3).unwrap();

        let base = state.cspace.object(p.tcb).unwrap().base();
        let thread = state.machine.threads.get(base).unwrap();
        assert_eq!(thread.cspace, p.cnode);
        assert_eq!(thread.vspace, p.pd);
        assert_eq!(thread.priority, 3);
        let CapObject::CNode(cnode) = state.cspace.object(p.cnode).unwrap() else {
            panic!("expected cnode");
        };
        assert_eq!(cnode.tcb, Some(base));
    }

    #[test]
    fn test_configure_type_checks() {
        let mut state = booted();
        let p = parts(&mut state);
        assert_eq!(
            configure(&mut state.cspace, &mut state.machine.threads, p.ep, p.ep, p.cnode, p.pd, 0),
            Err(CapError::InvalidCapability)
        );
        assert_eq!(
            configure(&mut state.cspace, &mut state.machine.threads, p.tcb, p.ep, p.pd, p.cnode, 0),
            Err(CapError::InvalidCapability)
        );
    }

    #[test]
    fn test_second_thread_already_bound() {
        let mut state = booted();
        let p = parts(&mut state);
        let [other] = alloc_objects(&mut state, &[(ObjectType::ThreadControlBlock, 0)]);
        configure(&mut state.cspace, &mut state.machine.threads, p.tcb, p.ep, p.cnode, p.pd, 0).unwrap();
        assert_eq!(
            configure(&mut state.cspace, &mut state.machine.threads, other, p.ep, p.cnode, p.pd, 0),
            Err(CapError::AlreadyBound)
        );
    }

    #[test]
    fn test_delete_tcb_unbinds_spaces() {
        let mut state = booted();
        let p = parts(&mut state);
        configure(&mut state.cspace, &mut state.machine.threads, p.tcb, p.ep, p.cnode, p.pd, 0).unwrap();
        atomik_cap::ops::delete(&mut state.cspace, &mut state.machine, p.tcb).unwrap();

        assert!(state.machine.threads.is_empty());
        let CapObject::PageDirectory(pd) = state.cspace.object(p.pd).unwrap() else {
            panic!("expected page directory");
        };
        assert_eq!(pd.tcb, None);
    }

    #[test]
    fn test_delete_vspace_detaches_thread() {
        let mut state = booted();
        let p = parts(&mut state);
        configure(&mut state.cspace, &mut state.machine.threads, p.tcb, p.ep, p.cnode, p.pd, 0).unwrap();
        atomik_cap::ops::delete(&mut state.cspace, &mut state.machine, p.pd).unwrap();

        let base = state.cspace.object(p.tcb).unwrap().base();
        assert!(state.machine.threads.get(base).unwrap().vspace.is_null());
    }

    #[test]
    fn test_set_regs() {
        let mut state = booted();
        let p = parts(&mut state);
        let regs = Registers {
            eip: 0x0804_8000,
            esp: 0xBFFF_F000,
            ..Registers::default()
        };
        set_regs(&state.cspace, &mut state.machine.threads, p.tcb, &regs).unwrap();
        let base = state.cspace.object(p.tcb).unwrap().base();
        assert_eq!(state.machine.threads.get(base).unwrap().regs.eip, 0x0804_8000);
        assert_eq!(
            set_regs(&state.cspace, &mut state.machine.threads, p.ep, &regs),
            Err(CapError::InvalidCapability)
        );
    }
}
