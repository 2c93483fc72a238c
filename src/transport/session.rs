//! Subscription session
//!
//! A `Session` is the protocol state of one WebSocket connection. It maps
//! peer-chosen operation ids to live hub registrations:
//!
//! - `start` registers a fresh `DeliveryBuffer` with the hub and spawns a
//!   forwarder that drains it into the connection's outbound channel as
//!   `next` frames, in the order the hub delivered them.
//! - `stop` unsubscribes, closes the buffer (discarding anything still queued)
//!   and frees the id for reuse.
//! - `close` stops every remaining operation. `Drop` calls it too, so the hub
//!   is cleaned up however the connection ends.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::broker::{DeliveryBuffer, Hub, MessageRecord, Registration};
use crate::transport::message::{ClientMessage, Outbound, ServerMessage};
use crate::utils::error::ProtocolError;

/// What the connection should do after a client frame was handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close { code: u16, reason: String },
}

/// Only errors that carry a close code end the connection; the rest are handed back.
impl TryFrom<ProtocolError> for Flow {
    type Error = ProtocolError;

    fn try_from(err: ProtocolError) -> Result<Self, ProtocolError> {
        match err.close_code() {
            Some(code) => Ok(Flow::Close {
                code,
                reason: err.to_string(),
            }),
            None => Err(err),
        }
    }
}

struct Operation {
    registration: Registration,
    buffer: Arc<DeliveryBuffer>,
    forwarder: JoinHandle<()>,
}

impl Operation {
    fn cancel(self, hub: &Hub) {
        hub.unsubscribe(&self.registration);
        self.buffer.close();
        self.forwarder.abort();
    }
}

pub struct Session {
    id: String,
    hub: Arc<Hub>,
    outbound: mpsc::Sender<Outbound>,
    buffer_capacity: usize,
    acknowledged: bool,
    operations: HashMap<String, Operation>,
}

impl Session {
    pub fn new(hub: Arc<Hub>, outbound: mpsc::Sender<Outbound>, buffer_capacity: usize) -> Self {
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            hub,
            outbound,
            buffer_capacity,
            acknowledged: false,
            operations: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_active(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    pub fn active_operations(&self) -> usize {
        self.operations.len()
    }

    /// Start delivering `topic` to `operation`.
    ///
    /// Must be called from within a Tokio runtime (it spawns the forwarder).
    pub fn start(&mut self, operation: String, topic: &str) -> Result<(), ProtocolError> {
        if self.operations.contains_key(&operation) {
            return Err(ProtocolError::DuplicateOperation(operation));
        }

        let buffer = Arc::new(DeliveryBuffer::new(self.buffer_capacity));
        let registration = self.hub.subscribe(topic, &buffer);
        let forwarder = tokio::spawn(forward(
            operation.clone(),
            buffer.clone(),
            self.outbound.clone(),
        ));

        info!(session = %self.id, operation = %operation, topic, "subscription started");
        self.operations.insert(
            operation,
            Operation {
                registration,
                buffer,
                forwarder,
            },
        );
        Ok(())
    }

    /// Stop an active operation. Unknown ids are ignored.
    pub fn stop(&mut self, operation: &str) -> bool {
        match self.operations.remove(operation) {
            Some(op) => {
                op.cancel(&self.hub);
                info!(session = %self.id, operation, "subscription stopped");
                true
            }
            None => {
                debug!(session = %self.id, operation, "stop for inactive operation ignored");
                false
            }
        }
    }

    /// Stop every active operation. Safe to call more than once.
    pub fn close(&mut self) {
        let count = self.operations.len();
        for (_, op) in self.operations.drain() {
            op.cancel(&self.hub);
        }
        if count > 0 {
            info!(session = %self.id, count, "released subscriptions");
        }
    }

    /// Parse and handle one text frame from the peer.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(err) => {
                warn!(
                    session = %self.id,
                    "Invalid client message: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                self.reject(ProtocolError::InvalidMessage).await
            }
        }
    }

    pub async fn handle(&mut self, msg: ClientMessage) -> Flow {
        match self.dispatch(msg).await {
            Ok(()) => Flow::Continue,
            Err(err) => self.reject(err).await,
        }
    }

    async fn dispatch(&mut self, msg: ClientMessage) -> Result<(), ProtocolError> {
        match msg {
            ClientMessage::ConnectionInit { .. } => {
                if self.acknowledged {
                    return Err(ProtocolError::AlreadyInitialised);
                }
                self.acknowledged = true;
                self.send(ServerMessage::ConnectionAck).await;
            }
            ClientMessage::Ping => self.send(ServerMessage::Pong).await,
            ClientMessage::Pong => {}
            ClientMessage::Start { .. } if !self.acknowledged => {
                warn!(session = %self.id, "start received before connection_init");
                return Err(ProtocolError::NotAcknowledged);
            }
            ClientMessage::Start { id, topic } => self.start(id, &topic)?,
            ClientMessage::Stop { id } => {
                self.stop(&id);
            }
        }
        Ok(())
    }

    /// Close on fatal errors; answer the rest with an `error` frame and carry on.
    async fn reject(&self, err: ProtocolError) -> Flow {
        match Flow::try_from(err) {
            Ok(flow) => flow,
            Err(err) => {
                warn!(session = %self.id, "{err}");
                let id = match &err {
                    ProtocolError::DuplicateOperation(id) => Some(id.clone()),
                    _ => None,
                };
                self.send(ServerMessage::Error {
                    id,
                    message: err.to_string(),
                })
                .await;
                Flow::Continue
            }
        }
    }

    pub async fn send(&self, msg: ServerMessage) {
        if self.outbound.send(Outbound::Message(msg)).await.is_err() {
            debug!(session = %self.id, "outbound channel closed, frame dropped");
        }
    }

    pub async fn send_close(&self, code: u16, reason: impl Into<String>) {
        let frame = Outbound::Close {
            code,
            reason: reason.into(),
        };
        if self.outbound.send(frame).await.is_err() {
            debug!(session = %self.id, "outbound channel closed, close frame dropped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

async fn forward(operation: String, buffer: Arc<DeliveryBuffer>, outbound: mpsc::Sender<Outbound>) {
    while let Some(event) = buffer.next().await {
        let Ok(permit) = outbound.reserve().await else {
            break;
        };
        // stopped while waiting for room on the connection
        if buffer.is_closed() {
            break;
        }
        permit.send(Outbound::Message(ServerMessage::Next {
            id: operation.clone(),
            payload: MessageRecord::from(&*event),
        }));
    }
    trace!(operation, "forwarder finished");
}
