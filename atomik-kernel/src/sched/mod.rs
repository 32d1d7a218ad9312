//! FIFO Scheduler
//!
//! Threads that have been pushed wait on a single run queue. The head of
//! the queue is the current thread; `schedule` rotates it to the tail and
//! picks the next head. When the queue is empty the idle thread runs,
//! represented by no current thread at all.
//!
//! # Key Concepts
//!
//! - **Push**: make a thread runnable. If nothing was running it becomes
//!   current straight away.
//! - **Pull**: take a thread off the queue. Pulling the current thread
//!   schedules first, so the CPU never runs a thread that is not queued.
//! - **Yield**: rotate and pick the next thread.
//!
//! The scheduler only decides *which* thread is current. Switching the
//! MMU to that thread's address space is done by the caller (see
//! [`crate::vspace::activate_current`]).

pub mod run_queue;

pub use run_queue::RunQueue;

use atomik_cap::{CapError, CapResult};
use atomik_common::PhysAddr;

use crate::task::{ThreadState, Threads};

impl Threads {
    /// The thread that owns the CPU, or `None` while idling.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> Option<PhysAddr> {
        self.current
    }

    /// Number of runnable threads.
    #[inline]
    #[must_use]
    pub fn runnable(&self) -> usize {
        self.run_queue.len()
    }

    /// Check whether `tcb` is on the run queue.
    #[inline]
    #[must_use]
    pub fn is_queued(&self, tcb: PhysAddr) -> bool {
        self.run_queue.contains(tcb)
    }

    /// Make `tcb` runnable.
    ///
    /// # Errors
    ///
    /// - `InvalidCapability`: no thread lives at `tcb`
    /// - `PullFirst`: the thread is already queued
    pub fn push(&mut self, tcb: PhysAddr) -> CapResult<()> {
        if self.run_queue.contains(tcb) {
            return Err(CapError::PullFirst);
        }
        let thread = self.table.get_mut(&tcb).ok_or(CapError::InvalidCapability)?;
        thread.state = ThreadState::Running;
        self.run_queue.push_back(tcb);
        if self.current.is_none() {
            self.current = Some(tcb);
        }
        log::debug!("sched: push {} ({} runnable)", tcb, self.run_queue.len());
        Ok(())
    }

    /// Take `tcb` off the run queue.
    ///
    /// # Errors
    ///
    /// - `InvalidCapability`: no thread lives at `tcb`
    /// - `PushFirst`: the thread is not queued
    pub fn pull(&mut self, tcb: PhysAddr) -> CapResult<()> {
        if !self.table.contains_key(&tcb) {
            return Err(CapError::InvalidCapability);
        }
        if !self.run_queue.contains(tcb) {
            return Err(CapError::PushFirst);
        }
        self.dequeue(tcb);
        if let Some(thread) = self.table.get_mut(&tcb) {
            thread.state = ThreadState::Inactive;
        }
        log::debug!("sched: pull {} ({} runnable)", tcb, self.run_queue.len());
        Ok(())
    }

    /// Rotate the run queue and pick the next current thread.
    ///
    /// Returns the new current thread, or `None` if the idle thread runs.
    pub fn schedule(&mut self) -> Option<PhysAddr> {
        if self.current.is_some() && self.current == self.run_queue.head() {
            self.run_queue.rotate();
        }
        self.current = self.run_queue.head();
        self.current
    }

    /// Remove `tcb` from the queue, moving the CPU on if it was current.
    pub(crate) fn dequeue(&mut self, tcb: PhysAddr) {
        if self.current == Some(tcb) {
            self.schedule();
        }
        self.run_queue.remove(tcb);
        if self.current == Some(tcb) || self.run_queue.is_empty() {
            self.current = self.run_queue.head();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PhysAddr = PhysAddr::new(0x0030_0000);
    const B: PhysAddr = PhysAddr::new(0x0030_0080);
    const C: PhysAddr = PhysAddr::new(0x0030_0100);

    fn threads() -> Threads {
        let mut threads = Threads::new();
        for tcb in [A, B, C] {
            threads.create(tcb);
        }
        threads
    }

    #[test]
    fn test_push_sets_current_when_idle() {
        let mut threads = threads();
        assert_eq!(threads.current(), None);
        threads.push(A).unwrap();
        threads.push(B).unwrap();
        assert_eq!(threads.current(), Some(A));
        assert_eq!(threads.get(B).unwrap().state, ThreadState::Running);
        assert_eq!(threads.push(A), Err(CapError::PullFirst));
    }

    #[test]
    fn test_yield_round_robin() {
        let mut threads = threads();
        for tcb in [A, B, C] {
            threads.push(tcb).unwrap();
        }
        assert_eq!(threads.schedule(), Some(B));
        assert_eq!(threads.schedule(), Some(C));
        assert_eq!(threads.schedule(), Some(A));
    }

    #[test]
    fn test_pull_current_moves_on() {
        let mut threads = threads();
        threads.push(A).unwrap();
        threads.push(B).unwrap();
        threads.pull(A).unwrap();
        assert_eq!(threads.current(), Some(B));
        assert_eq!(threads.get(A).unwrap().state, ThreadState::Inactive);
        assert_eq!(threads.pull(A), Err(CapError::PushFirst));

        threads.pull(B).unwrap();
        assert_eq!(threads.current(), None);
        assert_eq!(threads.schedule(), None);
    }

    #[test]
    fn test_pull_other_keeps_current() {
        let mut threads = threads();
        for tcb in [A, B, C] {
            threads.push(tcb).unwrap();
        }
        threads.pull(B).unwrap();
        assert_eq!(threads.current(), Some(A));
        assert_eq!(threads.schedule(), Some(C));
        assert_eq!(threads.runnable(), 2);
    }

    #[test]
    fn test_unknown_thread() {
        let mut threads = threads();
        let stray = PhysAddr::new(0x0040_0000);
        assert_eq!(threads.push(stray), Err(CapError::InvalidCapability));
        assert_eq!(threads.pull(stray), Err(CapError::InvalidCapability));
    }

    #[test]
    fn test_release_dequeues() {
        let mut threads = threads();
        threads.push(A).unwrap();
        threads.push(B).unwrap();
        threads.release(A);
        assert_eq!(threads.current(), Some(B));
        assert!(!threads.is_queued(A));
        assert_eq!(threads.len(), 2);
    }
}
