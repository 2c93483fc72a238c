//! The `persistence` module provides the durable, ordered message log.
//!
//! The log is the single source of truth: every message is appended here
//! before it is broadcast, and history is read back from it in one bulk,
//! id-ordered read.
//!
//! It uses `sled` as an embedded key-value store for efficient and durable
//! message storage.

pub mod sled_store;

pub use sled_store::{EventLog, SledLog, StoredMessage};
