//! The `persistence` module keeps a short history of published messages so a
//! subscriber attaching late can be replayed what it missed.
//!
//! History lives in `sled`, one tree per routing path.

pub mod sled_store;

pub use sled_store::History;
