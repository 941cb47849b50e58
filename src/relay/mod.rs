//! The `relay` module is a small development broker speaking the same frames
//! as the messenger, so `listen` and `bark` work without an external broker.

pub mod engine;
pub mod server;

pub use engine::{PendingDelivery, Relay, RetryReport};

#[cfg(test)]
mod tests;
