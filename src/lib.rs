//! # Barker
//!
//! `barker` is a small publish/subscribe messaging client with at-least-once
//! delivery, plus a development relay and the `barker` command line tools
//! for a toy chat ("barks" between dogs).
//!
//! ## Core Modules
//!
//! - `codec`: addresses, messages and the frames that carry them.
//! - `transport`: moves whole frames over TCP, WebSocket or in-process channels.
//! - `session`: subscriptions, staged sends and unacknowledged deliveries.
//! - `events`: `work`, `error` and `subscription` handlers.
//! - `client`: the [`Messenger`] tying all of the above together.
//! - `relay`: a development broker speaking the same frames.
//! - `persistence`: message history the relay replays to new subscribers.
//! - `barks`: chat conventions used by the command line tools.
//! - `config`: settings from files and the environment.
//! - `utils`: error types and logging setup.

pub mod barks;
pub mod client;
pub mod codec;
pub mod config;
pub mod events;
pub mod persistence;
pub mod relay;
pub mod session;
pub mod transport;
pub mod utils;

pub use client::{ClientState, Messenger};
pub use codec::{Address, Message, TextBody};
pub use events::{Event, EventKind};
pub use session::{Delivery, DeliveryToken};
pub use utils::error::{Error, Result};
