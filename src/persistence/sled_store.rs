//! Durable message log backed by `sled`
//!
//! Messages live in a single `messages` tree. Each key is the message id in
//! big-endian form, so a plain iteration yields messages in insertion order.
//! Values are JSON rows shaped like the `messages` table clients know:
//! `{id, username, text, timestamp}`.
//!
//! Ids come from `sled::Db::generate_id`, which is atomic and monotonic across
//! restarts. A crash may leave gaps, but an id is never handed out twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::broker::message::{Event, MESSAGE_SENT};
use crate::config::StorageSettings;
use crate::utils::error::StorageError;

/// Append-only, ordered store of chat messages.
pub trait EventLog: Send + Sync {
    /// Persist a new message and return it with its assigned id and timestamp.
    fn append(&self, user: &str, text: &str) -> Result<Event, StorageError>;

    /// Every stored message, ordered by id ascending.
    fn list_all(&self) -> Result<Vec<Event>, StorageError>;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredMessage {
    pub id: u64,
    pub username: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    fn into_event(self) -> Event {
        Event {
            id: self.id,
            topic: MESSAGE_SENT.to_string(),
            user: self.username,
            text: self.text,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Clone)]
pub struct SledLog {
    db: Db,
    pub(crate) messages: Tree,
    flush_on_append: bool,
}

impl SledLog {
    const TREE: &'static str = "messages";

    /// Open or create the log at the configured path.
    pub fn open(settings: &StorageSettings) -> Result<Self, StorageError> {
        let db = sled::open(&settings.path)?;
        info!(path = %settings.path, "opened message log");
        Self::with_db(db, settings.flush_on_append)
    }

    /// A throwaway log that is deleted when dropped.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db, false)
    }

    fn with_db(db: Db, flush_on_append: bool) -> Result<Self, StorageError> {
        let messages = db.open_tree(Self::TREE)?;
        Ok(Self {
            db,
            messages,
            flush_on_append,
        })
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl EventLog for SledLog {
    fn append(&self, user: &str, text: &str) -> Result<Event, StorageError> {
        // generate_id starts at zero; ids handed to clients start at one
        let id = self.db.generate_id()? + 1;
        let row = StoredMessage {
            id,
            username: user.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        let serialized = serde_json::to_vec(&row)?;

        if self
            .messages
            .compare_and_swap(id.to_be_bytes(), None::<&[u8]>, Some(serialized))?
            .is_err()
        {
            return Err(StorageError::Rejected(format!("message id {id} already exists")));
        }

        if self.flush_on_append {
            self.messages.flush()?;
        }

        debug!(id, user, "appended message");
        Ok(row.into_event())
    }

    fn list_all(&self) -> Result<Vec<Event>, StorageError> {
        self.messages
            .iter()
            .values()
            .map(|value| -> Result<Event, StorageError> {
                let row: StoredMessage = serde_json::from_slice(&value?)?;
                Ok(row.into_event())
            })
            .collect()
    }
}

impl std::fmt::Debug for SledLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledLog")
            .field("db", &"sled::Db")
            .field("flush_on_append", &self.flush_on_append)
            .finish()
    }
}
