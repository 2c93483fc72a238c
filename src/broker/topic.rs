//! Topic management
//!
//! A `Topic` holds the live registrations for one topic name. Registrations
//! keep only a `Weak` handle to their sink: the hub never keeps a closed
//! session alive, and a handle that no longer upgrades is simply skipped.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the hub keeps
//! each one behind its map shard lock).

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::broker::message::Event;
use crate::utils::error::SinkUnavailable;

pub type RegistrationId = u64;

/// A delivery target registered with the hub.
///
/// `deliver` must not block: it is called while the hub holds a shard lock.
pub trait Sink: Send + Sync {
    fn deliver(&self, event: Arc<Event>) -> Result<(), SinkUnavailable>;
}

#[derive(Default)]
pub struct Topic {
    pub name: String,
    subscribers: HashMap<RegistrationId, Weak<dyn Sink>>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
        }
    }

    /// Add a registration. Ids are unique, so this never replaces one.
    pub fn subscribe(&mut self, id: RegistrationId, sink: Weak<dyn Sink>) {
        self.subscribers.insert(id, sink);
    }

    /// Remove a registration, returning whether it was present.
    pub fn unsubscribe(&mut self, id: RegistrationId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn contains(&self, id: RegistrationId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegistrationId, &Weak<dyn Sink>)> {
        self.subscribers.iter()
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
