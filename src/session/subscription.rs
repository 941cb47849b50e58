//! A `Subscription` ties a routing pattern to the FIFO queue of messages that
//! arrived for it and have not been handed out yet.

use std::collections::VecDeque;
use std::fmt;

use crate::codec::Message;

/// Identifies a subscription; also the link handle used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u32);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) struct Queued {
    /// Session-wide arrival sequence, used to merge queues in arrival order.
    pub arrival: u64,
    /// Delivery id chosen by the broker.
    pub remote: u64,
    pub message: Message,
}

#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub pattern: String,
    /// Set once the broker has acknowledged the attach.
    pub confirmed: bool,
    queue: VecDeque<Queued>,
}

impl Subscription {
    pub fn new(handle: SubscriptionHandle, pattern: &str) -> Self {
        Self {
            handle,
            pattern: pattern.to_string(),
            confirmed: false,
            queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn push(&mut self, queued: Queued) {
        self.queue.push_back(queued);
    }

    pub(crate) fn front_arrival(&self) -> Option<u64> {
        self.queue.front().map(|q| q.arrival)
    }

    pub(crate) fn pop(&mut self) -> Option<Queued> {
        self.queue.pop_front()
    }

    /// Broker delivery ids of everything still queued, emptying the queue.
    pub(crate) fn drain_remote_ids(&mut self) -> Vec<u64> {
        self.queue.drain(..).map(|q| q.remote).collect()
    }
}
