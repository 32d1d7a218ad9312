//! Endpoint and notification capabilities
//!
//! Only the object state lives here. Message transfer is not part of the
//! object-management core; endpoints are created idle with an empty wait
//! queue and stay that way until an IPC layer drives them.
//!
//! # Thread Queues
//!
//! The queue is a list of thread control blocks named by physical base,
//! linked through the threads themselves:
//! - `Send`: threads waiting to send
//! - `Recv`: threads waiting to receive
//! - The endpoint is never in both states simultaneously

use atomik_common::PhysAddr;

use crate::rights::CapRights;

/// Endpoint state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EndpointState {
    /// No threads waiting.
    #[default]
    Idle = 0,
    /// Threads waiting to send.
    Send = 1,
    /// Threads waiting to receive.
    Recv = 2,
}

/// Endpoint capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointCap {
    /// Physical base address.
    pub base: PhysAddr,
    /// Access rights.
    pub rights: CapRights,
    /// Queue state.
    pub state: EndpointState,
    /// Badge delivered to receivers.
    pub badge: u32,
    /// First waiting thread.
    pub queue_head: Option<PhysAddr>,
    /// Last waiting thread.
    pub queue_tail: Option<PhysAddr>,
}

impl EndpointCap {
    /// Create an idle endpoint capability.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, rights: CapRights) -> Self {
        Self {
            base,
            rights,
            state: EndpointState::Idle,
            badge: 0,
            queue_head: None,
            queue_tail: None,
        }
    }

    /// Check if no threads are waiting.
    #[inline]
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, EndpointState::Idle)
    }
}

/// Notification capability payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotificationCap {
    /// Physical base address.
    pub base: PhysAddr,
    /// Access rights.
    pub rights: CapRights,
    /// Badge OR'd into the signal word.
    pub badge: u32,
    /// Accumulated signal word.
    pub pending: u32,
}

impl NotificationCap {
    /// Create a notification capability with no pending signals.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysAddr, rights: CapRights) -> Self {
        Self {
            base,
            rights,
            badge: 0,
            pending: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_starts_idle() {
        let ep = EndpointCap::new(PhysAddr::new(0x0020_4000), CapRights::ALL);
        assert!(ep.is_idle());
        assert_eq!(ep.badge, 0);
        assert_eq!(ep.queue_head, None);
    }
}
