//! Run Queue Implementation
//!
//! A FIFO of runnable threads, named by the physical base of their TCB.

extern crate alloc;

use alloc::collections::VecDeque;

use atomik_common::PhysAddr;

/// Queue of runnable threads.
#[derive(Debug, Default)]
pub struct RunQueue {
    queue: VecDeque<PhysAddr>,
}

impl RunQueue {
    /// Create a new empty run queue.
    pub const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Check if the run queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the number of threads in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Get the head of the queue.
    #[inline]
    pub fn head(&self) -> Option<PhysAddr> {
        self.queue.front().copied()
    }

    /// Check whether `tcb` is queued.
    pub fn contains(&self, tcb: PhysAddr) -> bool {
        self.queue.contains(&tcb)
    }

    /// Append a thread at the tail.
    pub fn push_back(&mut self, tcb: PhysAddr) {
        self.queue.push_back(tcb);
    }

    /// Remove a thread wherever it is. Returns whether it was queued.
    pub fn remove(&mut self, tcb: PhysAddr) -> bool {
        match self.queue.iter().position(|&queued| queued == tcb) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Move the head to the tail.
    pub fn rotate(&mut self) {
        if let Some(head) = self.queue.pop_front() {
            self.queue.push_back(head);
        }
    }

    /// Iterate over queued threads, head first.
    pub fn iter(&self) -> impl Iterator<Item = PhysAddr> + '_ {
        self.queue.iter().copied()
    }
}
