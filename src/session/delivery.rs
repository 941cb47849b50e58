use std::fmt;

use crate::codec::Message;
use crate::session::subscription::SubscriptionHandle;

/// Acknowledgement token handed out with every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryToken(pub u64);

impl fmt::Display for DeliveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a delivery once handed out by `get`.
///
/// `Pending` moves to `Accepted` (terminal) or to `Redelivered` when the
/// connection goes away before the accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Accepted,
    Redelivered,
}

/// A message handed to the application, awaiting `accept`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub token: DeliveryToken,
    pub subscription: SubscriptionHandle,
    pub message: Message,
}
