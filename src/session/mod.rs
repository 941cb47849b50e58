//! The `session` module tracks subscriptions, staged sends and pending
//! acknowledgements for a single messenger connection.

pub mod delivery;
pub mod engine;
pub mod subscription;

pub use delivery::{Delivery, DeliveryState, DeliveryToken};
pub use engine::Session;
pub use subscription::{Subscription, SubscriptionHandle};

#[cfg(test)]
mod tests;
