//! Broadcast hub
//!
//! This module contains the process-wide, in-memory router responsible for:
//! - keeping a topic -> registrations map
//! - fanning a published event out to every live registration of its topic
//! - releasing a registration (and an emptied topic) on `unsubscribe`
//!
//! Concurrency and usage notes:
//! - The map is a `DashMap`, so `subscribe`, `unsubscribe` and `publish` only
//!   lock the shard owning the topic. There is no hub-wide lock.
//! - `publish` hands each event to its sink while holding the shard read guard.
//!   Sinks must not block (see `Sink`). Because `unsubscribe` takes the write
//!   guard, no delivery reaches a registration after `unsubscribe` returns.
//! - A `Hub` is an ordinary value: build one at start-up and share it as
//!   `Arc<Hub>` with the gateway and every session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::broker::message::Event;
use crate::broker::topic::{RegistrationId, Sink, Topic};
use crate::utils::error::SinkUnavailable;

/// Handle returned by `Hub::subscribe`, used to cancel the registration.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Registration {
    topic: String,
    id: RegistrationId,
}

impl Registration {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

#[derive(Debug, Default)]
pub struct Hub {
    topics: DashMap<String, Topic>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sink` under `topic`. Automatically creates the topic if it doesn't exist.
    ///
    /// The hub keeps only a weak reference; the caller owns the sink.
    pub fn subscribe<S: Sink + 'static>(&self, topic: &str, sink: &Arc<S>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<S> = Arc::downgrade(sink);
        let weak: Weak<dyn Sink> = weak;

        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id, weak);

        debug!(topic, registration = id, "registered subscriber");
        Registration {
            topic: topic.to_string(),
            id,
        }
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, registration: &Registration) -> bool {
        let removed = match self.topics.get_mut(&registration.topic) {
            Some(mut topic) => topic.unsubscribe(registration.id),
            None => false,
        };

        if removed {
            self.topics
                .remove_if(&registration.topic, |_, topic| topic.is_empty());
            debug!(
                topic = %registration.topic,
                registration = registration.id,
                "removed subscriber"
            );
        }
        removed
    }

    /// Delivers `event` to every current registration of `topic`.
    ///
    /// Failures are per sink and never reach the caller. Returns the number of
    /// sinks that accepted the event.
    pub fn publish(&self, topic: &str, event: Arc<Event>) -> usize {
        let Some(subscribers) = self.topics.get(topic) else {
            trace!(topic, event_id = event.id, "no subscribers");
            return 0;
        };

        let mut delivered = 0;
        for (id, weak) in subscribers.iter() {
            let result = match weak.upgrade() {
                Some(sink) => sink.deliver(Arc::clone(&event)),
                None => Err(SinkUnavailable),
            };
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(topic, registration = *id, error = %e, "skipping delivery"),
            }
        }

        trace!(topic, event_id = event.id, delivered, "published event");
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|t| t.len()).unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn is_registered(&self, registration: &Registration) -> bool {
        self.topics
            .get(&registration.topic)
            .is_some_and(|t| t.contains(registration.id))
    }
}
