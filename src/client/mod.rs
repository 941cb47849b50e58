//! The `client` module holds the [`Messenger`], the caller-facing facade that
//! ties a transport, the session bookkeeping and the event dispatcher together.

pub mod messenger;

pub use messenger::{ClientState, Messenger};
