//! Session engine
//!
//! Client-side bookkeeping for one connection:
//! - subscriptions keyed by pattern, each with its own FIFO delivery queue
//! - messages staged by `put` until the next `send`
//! - deliveries handed out by `get` and not yet accepted
//!
//! The session does no I/O. The messenger feeds it decoded frames and turns
//! what it returns into outbound frames.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::codec::{Address, Message};
use crate::session::delivery::{Delivery, DeliveryState, DeliveryToken};
use crate::session::subscription::{Queued, Subscription, SubscriptionHandle};
use crate::utils::error::{AckError, Error, Result};

#[derive(Debug)]
struct Unacked {
    remote: u64,
}

#[derive(Debug, Default)]
pub struct Session {
    subscriptions: BTreeMap<SubscriptionHandle, Subscription>,
    by_pattern: HashMap<String, SubscriptionHandle>,
    outgoing: VecDeque<Message>,
    unacked: HashMap<DeliveryToken, Unacked>,
    redelivered: HashSet<DeliveryToken>,
    next_handle: u32,
    next_token: u64,
    next_arrival: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `pattern`. Subscribing twice returns the existing handle.
    pub fn subscribe(&mut self, pattern: &str) -> SubscriptionHandle {
        if let Some(handle) = self.by_pattern.get(pattern) {
            return *handle;
        }

        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.subscriptions
            .insert(handle, Subscription::new(handle, pattern));
        self.by_pattern.insert(pattern.to_string(), handle);
        debug!("subscription {handle} created for '{pattern}'");
        handle
    }

    pub fn handle_for(&self, pattern: &str) -> Option<SubscriptionHandle> {
        self.by_pattern.get(pattern).copied()
    }

    /// Remove a subscription. Returns the broker delivery ids of messages that
    /// were still queued on it, so they can be handed back.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Option<Vec<u64>> {
        let mut subscription = self.subscriptions.remove(&handle)?;
        self.by_pattern.remove(&subscription.pattern);
        Some(subscription.drain_remote_ids())
    }

    /// Record the broker's acknowledgement. False for unknown handles.
    pub fn confirm(&mut self, handle: SubscriptionHandle) -> bool {
        match self.subscriptions.get_mut(&handle) {
            Some(subscription) => {
                subscription.confirmed = true;
                true
            }
            None => false,
        }
    }

    pub fn subscription(&self, handle: SubscriptionHandle) -> Option<&Subscription> {
        self.subscriptions.get(&handle)
    }

    /// The most specific subscription whose pattern routes `address`.
    pub fn route(&self, address: &Address) -> Option<SubscriptionHandle> {
        address
            .routes()
            .iter()
            .find_map(|route| self.by_pattern.get(route).copied())
    }

    /// Queue an arrived message on its subscription. Unmatched messages are
    /// dropped with a warning and `None` is returned.
    pub fn enqueue_incoming(&mut self, remote: u64, message: Message) -> Option<SubscriptionHandle> {
        let Some(handle) = self.route(message.address()) else {
            warn!(
                "dropping delivery {remote}: no subscription matches '{}'",
                message.address()
            );
            return None;
        };

        let arrival = self.next_arrival;
        self.next_arrival += 1;
        if let Some(subscription) = self.subscriptions.get_mut(&handle) {
            subscription.push(Queued {
                arrival,
                remote,
                message,
            });
        }
        Some(handle)
    }

    pub fn incoming(&self) -> bool {
        self.subscriptions.values().any(|s| !s.is_empty())
    }

    pub fn pending_count(&self) -> usize {
        self.subscriptions.values().map(Subscription::len).sum()
    }

    /// Pop the oldest queued message across all subscriptions.
    pub fn get(&mut self) -> Result<Delivery> {
        let handle = self
            .subscriptions
            .values()
            .filter_map(|s| s.front_arrival().map(|arrival| (arrival, s.handle)))
            .min()
            .map(|(_, handle)| handle)
            .ok_or(Error::Empty)?;

        let queued = self
            .subscriptions
            .get_mut(&handle)
            .and_then(Subscription::pop)
            .ok_or(Error::Empty)?;

        let token = DeliveryToken(self.next_token);
        self.next_token += 1;
        self.unacked.insert(
            token,
            Unacked {
                remote: queued.remote,
            },
        );

        Ok(Delivery {
            token,
            subscription: handle,
            message: queued.message,
        })
    }

    /// Settle a delivery. Returns the broker's delivery id for the disposition.
    pub fn accept(&mut self, token: DeliveryToken) -> std::result::Result<u64, AckError> {
        if let Some(unacked) = self.unacked.remove(&token) {
            return Ok(unacked.remote);
        }
        if self.redelivered.contains(&token) {
            return Err(AckError::Redelivered(token));
        }
        if token.0 < self.next_token {
            return Err(AckError::AlreadySettled(token));
        }
        Err(AckError::Unknown(token))
    }

    pub fn delivery_state(&self, token: DeliveryToken) -> Option<DeliveryState> {
        if self.unacked.contains_key(&token) {
            Some(DeliveryState::Pending)
        } else if self.redelivered.contains(&token) {
            Some(DeliveryState::Redelivered)
        } else if token.0 < self.next_token {
            Some(DeliveryState::Accepted)
        } else {
            None
        }
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    pub fn stage(&mut self, message: Message) {
        self.outgoing.push_back(message);
    }

    pub fn staged(&self) -> usize {
        self.outgoing.len()
    }

    pub fn drain_outgoing(&mut self) -> Vec<Message> {
        self.outgoing.drain(..).collect()
    }

    /// Give every unaccepted delivery back to the broker's redelivery and
    /// forget queued messages. Used when the connection goes away.
    /// Returns how many handed-out deliveries were released.
    pub fn release(&mut self) -> usize {
        let released = self.unacked.len();
        self.redelivered.extend(self.unacked.drain().map(|(token, _)| token));
        for subscription in self.subscriptions.values_mut() {
            subscription.drain_remote_ids();
        }
        released
    }
}
