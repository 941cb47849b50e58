//! The `codec` module defines what travels on the wire: addresses, chat
//! messages and the protocol frames wrapping them.

pub mod address;
pub mod frame;
pub mod message;
mod wire;

pub use address::Address;
pub use frame::{Frame, Outcome};
pub use message::{Message, TextBody};

#[cfg(test)]
mod tests;
