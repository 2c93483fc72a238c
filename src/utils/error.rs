//! The `error` module defines the error types shared across `chatwire`.
//!
//! Each failure class lives in its own enum so callers can tell storage
//! outages apart from protocol misuse:
//!
//! - `StorageError`: the durable log could not be read or written.
//! - `ProtocolError`: a subscription peer broke the session protocol.
//! - `SinkUnavailable`: a hub delivery target is gone. Never surfaced to publishers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sled::Error),

    #[error("failed to encode or decode stored message: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Subscriber for {0} already exists")]
    DuplicateOperation(String),

    #[error("Unauthorized")]
    NotAcknowledged,

    #[error("Too many initialisation requests")]
    AlreadyInitialised,

    #[error("Invalid message received")]
    InvalidMessage,
}

impl ProtocolError {
    /// WebSocket close code for errors that terminate the connection.
    ///
    /// `DuplicateOperation` only rejects the offending `start`, so it has none.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            ProtocolError::DuplicateOperation(_) => None,
            ProtocolError::NotAcknowledged => Some(4401),
            ProtocolError::AlreadyInitialised => Some(4429),
            ProtocolError::InvalidMessage => Some(4400),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("delivery sink is unavailable")]
pub struct SinkUnavailable;
