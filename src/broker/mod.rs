//! The broker owns the in-memory side of publish/subscribe: the `Hub` that
//! routes events by topic, the `DeliveryBuffer` sinks it delivers into, and
//! the `Event` record itself.
//!
//! This module is used by the gateway (producer side) and by subscription
//! sessions (consumer side); it knows nothing about sockets or storage.

pub mod buffer;
pub mod hub;
pub mod message;
pub mod topic;

pub use buffer::DeliveryBuffer;
pub use hub::{Hub, Registration};
pub use message::{Event, MESSAGE_SENT, MessageRecord};
pub use topic::Sink;
