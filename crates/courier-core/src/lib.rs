//! Core engine for courier: sender sessions, pairing and bulk-send tasks.
//!
//! This crate is intentionally protocol-agnostic. The chat protocol, its handshake
//! and credential format live behind the transport port (traits) implemented in
//! adapter crates.

pub mod config;
pub mod courier;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod logging;
pub mod messages;
pub mod pairing;
pub mod stats;
pub mod supervisor;
pub mod tasks;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use courier::Courier;
pub use errors::{Error, Result};
