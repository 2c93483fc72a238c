//! Event definitions for the broker
//!
//! `Event` is the internal, immutable record produced by the durable log and
//! fanned out by the hub. `MessageRecord` is its client-facing form, shared
//! by the HTTP gateway responses and the subscription `next` frames.
//!
//! Notes on fields:
//! - `id`: assigned by the log at insert time; strictly increasing, never reused
//! - `topic`: routing key for the hub; always `MESSAGE_SENT` for chat messages
//! - `timestamp`: assigned by the log at insert time, UTC

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Topic every appended chat message is published on.
pub const MESSAGE_SENT: &str = "MESSAGE_SENT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: u64,
    pub topic: String,
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    pub user: String,
    pub text: String,
    pub timestamp: String,
}

impl From<&Event> for MessageRecord {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            user: event.user.clone(),
            text: event.text.clone(),
            timestamp: event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
