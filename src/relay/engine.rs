//! Relay engine
//!
//! In-memory routing core of the development relay:
//! - clients and the subscription patterns each has attached
//! - routing of published messages to every matching subscriber
//! - deliveries sent but not yet settled, retried until accepted
//! - message history for replay via [`History`]
//!
//! The API is synchronous and meant to sit behind `Arc<Mutex<Relay>>`.
//! Outbound frames go into each client's channel, so the lock is never held
//! across network I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::codec::{Frame, Message, Outcome};
use crate::config::RelaySettings;
use crate::persistence::History;

pub type ClientId = String;

#[derive(Debug)]
struct Client {
    sender: UnboundedSender<Frame>,
    /// Attached patterns by the client's link handle.
    subscriptions: HashMap<u32, String>,
}

impl Client {
    fn wants(&self, message: &Message) -> bool {
        self.subscriptions
            .values()
            .any(|pattern| message.address().matches(pattern))
    }
}

#[derive(Debug, Clone)]
pub struct PendingDelivery {
    pub client: ClientId,
    pub message: Message,
    pub sent_at: i64,
    pub retries: u8,
}

/// What one pass of the retry loop did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    pub resent: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct Relay {
    clients: HashMap<ClientId, Client>,
    pending: HashMap<u64, PendingDelivery>,
    history: Option<History>,
    next_delivery: u64,
    ack_timeout_ms: i64,
    max_retries: u8,
}

impl Relay {
    pub fn new(settings: &RelaySettings, history: Option<History>) -> Self {
        Self {
            clients: HashMap::new(),
            pending: HashMap::new(),
            history,
            next_delivery: 0,
            ack_timeout_ms: i64::try_from(settings.ack_timeout_ms).unwrap_or(i64::MAX),
            max_retries: settings.max_retries,
        }
    }

    pub fn register_client(&mut self, id: ClientId, sender: UnboundedSender<Frame>) {
        self.clients.insert(
            id,
            Client {
                sender,
                subscriptions: HashMap::new(),
            },
        );
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self, delivery: u64) -> Option<&PendingDelivery> {
        self.pending.get(&delivery)
    }

    /// Attach `pattern` for a client, acknowledge it and replay history.
    pub fn attach(&mut self, client_id: &ClientId, handle: u32, pattern: String) {
        let Some(client) = self.clients.get_mut(client_id) else {
            warn!("attach from unregistered client {client_id}");
            return;
        };
        info!("{client_id} subscribed to '{pattern}'");
        let earlier: Vec<String> = client.subscriptions.values().cloned().collect();
        client.subscriptions.insert(handle, pattern.clone());
        let _ = client.sender.send(Frame::Attached { handle });

        let replay = match &self.history {
            Some(history) => history.replay(&pattern).unwrap_or_else(|e| {
                warn!("history replay for '{pattern}' failed: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        for message in replay {
            // already replayed when an earlier pattern attached
            if earlier.iter().any(|p| message.address().matches(p)) {
                continue;
            }
            self.deliver(client_id, message);
        }
    }

    pub fn detach(&mut self, client_id: &ClientId, handle: u32) {
        if let Some(pattern) = self
            .clients
            .get_mut(client_id)
            .and_then(|client| client.subscriptions.remove(&handle))
        {
            info!("{client_id} unsubscribed from '{pattern}'");
        }
    }

    /// Store `message` and send it to every subscriber it routes to.
    /// Returns the number of recipients.
    pub fn publish(&mut self, message: Message) -> usize {
        if let Some(history) = &self.history {
            if let Err(e) = history.store(&message) {
                warn!("failed to store message for {}: {e}", message.address());
            }
        }

        let recipients: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.wants(&message))
            .map(|(id, _)| id.clone())
            .collect();

        if recipients.is_empty() {
            debug!("no subscribers for {}", message.address());
        }
        for id in &recipients {
            self.deliver(id, message.clone());
        }
        recipients.len()
    }

    fn deliver(&mut self, client_id: &ClientId, message: Message) {
        let Some(client) = self.clients.get(client_id) else {
            return;
        };
        let delivery = self.next_delivery;
        self.next_delivery += 1;

        if let Err(e) = client.sender.send(Frame::Transfer {
            delivery,
            message: message.clone(),
        }) {
            warn!("failed to queue delivery {delivery} for {client_id}: {e}");
            return;
        }
        self.pending.insert(
            delivery,
            PendingDelivery {
                client: client_id.clone(),
                message,
                sent_at: chrono::Utc::now().timestamp_millis(),
                retries: 0,
            },
        );
    }

    /// A client settled a delivery. Both outcomes end redelivery.
    pub fn settle(&mut self, client_id: &ClientId, delivery: u64, outcome: Outcome) {
        match self.pending.get(&delivery) {
            Some(pending) if &pending.client == client_id => {
                self.pending.remove(&delivery);
                debug!("delivery {delivery} settled by {client_id}: {outcome:?}");
            }
            _ => warn!("{client_id} settled unknown delivery {delivery}"),
        }
    }

    /// Forget a client and everything still pending for it.
    pub fn cleanup_client(&mut self, client_id: &ClientId) {
        if self.clients.remove(client_id).is_none() {
            return;
        }
        let before = self.pending.len();
        self.pending.retain(|_, pending| &pending.client != client_id);
        info!(
            "cleaned up client {client_id}, {} deliveries abandoned",
            before - self.pending.len()
        );
    }

    /// Re-send deliveries unsettled for longer than the ack timeout, dropping
    /// those already retried `max_retries` times.
    pub fn retry_due(&mut self, now_ms: i64) -> RetryReport {
        let mut report = RetryReport::default();
        let due: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, pending)| now_ms - pending.sent_at > self.ack_timeout_ms)
            .map(|(delivery, _)| *delivery)
            .collect();

        for delivery in due {
            let Some(pending) = self.pending.get_mut(&delivery) else {
                continue;
            };
            if pending.retries >= self.max_retries {
                warn!(
                    "delivery {delivery} to {} dropped after {} retries",
                    pending.client, self.max_retries
                );
                self.pending.remove(&delivery);
                report.dropped += 1;
                continue;
            }

            pending.retries += 1;
            pending.sent_at = now_ms;
            info!(
                "re-sending delivery {delivery} to {}, retry {}",
                pending.client, pending.retries
            );
            let sent = self.clients.get(&pending.client).is_some_and(|client| {
                client
                    .sender
                    .send(Frame::Transfer {
                        delivery,
                        message: pending.message.clone(),
                    })
                    .is_ok()
            });
            if sent {
                report.resent += 1;
            } else {
                warn!("client {} is gone, dropping delivery {delivery}", pending.client);
                self.pending.remove(&delivery);
                report.dropped += 1;
            }
        }
        report
    }

    pub async fn start_retry_loop(relay: Arc<Mutex<Relay>>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp_millis();
            let report = lock(&relay).retry_due(now);
            if report != RetryReport::default() {
                debug!("retry pass: {report:?}");
            }
        }
    }
}

/// Lock the relay, recovering from a poisoned mutex.
pub fn lock(relay: &Mutex<Relay>) -> MutexGuard<'_, Relay> {
    relay.lock().unwrap_or_else(PoisonError::into_inner)
}
