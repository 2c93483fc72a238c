//! # Chatwire
//!
//! `chatwire` is a small chat backend: messages are appended to a durable
//! log and pushed live to every subscriber over WebSockets.
//!
//! ## Core Modules
//!
//! - `broker`: the in-process broadcast hub, topics, delivery buffers and event types.
//! - `config`: loads server configuration from a file and the environment.
//! - `gateway`: the producer side. Reads history and appends-then-publishes, over HTTP.
//! - `persistence`: the durable message log backed by `sled`.
//! - `transport`: the WebSocket subscription endpoint and per-connection sessions.
//! - `utils`: shared error types and logging setup.

pub mod broker;
pub mod config;
pub mod gateway;
pub mod persistence;
pub mod transport;
pub mod utils;
