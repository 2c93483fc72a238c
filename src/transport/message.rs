use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::message::{MESSAGE_SENT, MessageRecord};

/// WebSocket sub-protocol offered to clients that ask for it.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "connection_init")]
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename = "start", alias = "subscribe")]
    Start {
        id: String,
        #[serde(default = "default_topic")]
        topic: String,
    },
    #[serde(rename = "stop", alias = "complete")]
    Stop { id: String },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

fn default_topic() -> String {
    MESSAGE_SENT.to_string()
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connection_ack")]
    ConnectionAck,
    #[serde(rename = "next")]
    Next { id: String, payload: MessageRecord },
    #[serde(rename = "error")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
    },
    #[serde(rename = "pong")]
    Pong,
}

/// A frame queued for a connection's socket writer.
#[derive(Debug, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}
