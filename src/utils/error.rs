//! The `error` module defines the error types used across `barker`.
//!
//! Everything fallible in the crate returns [`Result`], whose error side is the
//! single [`Error`] enum. Per-message failures (decode, ack) have their own
//! small enums so callers receiving them through the `error` event can still
//! match on the cause.

use thiserror::Error;

use crate::client::ClientState;
use crate::session::DeliveryToken;

/// Top-level error type for the messaging client, the relay and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker endpoint was unreachable or refused the connection.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Socket failure while a session was running, or an operation that
    /// needs a live connection was attempted without one.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be decoded. The frame is dropped; the session continues.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Accept on an unknown or already settled delivery.
    #[error("ack error: {0}")]
    Ack(#[from] AckError),

    /// `get` was called with nothing pending. Control flow, not a failure.
    #[error("no pending deliveries")]
    Empty,

    /// Connect or send exceeded its configured deadline.
    #[error("operation timed out")]
    Timeout,

    /// Lifecycle operation called in the wrong state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ClientState,
    },

    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// The peer sent a frame that makes no sense in this direction.
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    /// An event handler returned an error or panicked.
    #[error("event handler failed: {0}")]
    Handler(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
}

/// Reasons a byte buffer is not a valid message or frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("{0} trailing bytes after end of frame")]
    TrailingBytes(usize),

    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),

    #[error("unknown disposition outcome {0}")]
    UnknownOutcome(u8),

    #[error("field is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Failures of `accept`. Never fatal to the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AckError {
    #[error("delivery {0} is unknown")]
    Unknown(DeliveryToken),

    #[error("delivery {0} was already settled")]
    AlreadySettled(DeliveryToken),

    /// The connection went away before the accept; the broker owns it again.
    #[error("delivery {0} was released for redelivery")]
    Redelivered(DeliveryToken),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("missing host in '{0}'")]
    MissingHost(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
