//! Shared utilities: the crate error types and logging setup.

pub mod error;
pub mod logging;
