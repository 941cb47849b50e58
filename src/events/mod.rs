//! The `events` module lets callers observe the messenger: `work` when
//! deliveries are waiting, `error` for recoverable failures, and
//! `subscription` when the broker acknowledges a subscribe.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, Event, EventKind, HandlerResult};

#[cfg(test)]
mod tests;
