use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broker::{Hub, MessageRecord};
use crate::persistence::EventLog;
use crate::utils::error::StorageError;

pub struct Gateway {
    log: Arc<dyn EventLog>,
    hub: Arc<Hub>,
}

impl Gateway {
    pub fn new(log: Arc<dyn EventLog>, hub: Arc<Hub>) -> Self {
        Self { log, hub }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// List every stored message, oldest first. The hub is not involved.
    pub fn handle_read(&self) -> Result<Vec<MessageRecord>, StorageError> {
        let events = self.log.list_all()?;
        debug!(count = events.len(), "listed messages");
        Ok(events.iter().map(MessageRecord::from).collect())
    }

    /// Append a message and broadcast the stored event.
    ///
    /// Nothing is published when the log rejects the write.
    pub fn handle_append(&self, user: &str, text: &str) -> Result<MessageRecord, StorageError> {
        let event = match self.log.append(user, text) {
            Ok(event) => event,
            Err(e) => {
                warn!(user, "append failed: {e}");
                return Err(e);
            }
        };

        let record = MessageRecord::from(&event);
        let topic = event.topic.clone();
        let delivered = self.hub.publish(&topic, Arc::new(event));
        info!(id = record.id, user, topic = %topic, delivered, "message sent");
        Ok(record)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").field("hub", &self.hub).finish()
    }
}
