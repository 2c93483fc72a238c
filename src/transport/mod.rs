//! The `transport` module is responsible for handling network communication
//! with subscription clients via WebSockets.
//!
//! It defines the messaging protocol used between clients and the server
//! (`message`), the per-connection protocol state machine (`session`), and
//! the WebSocket server itself (`websocket`).

pub mod message;
pub mod session;
pub mod websocket;

pub use message::{ClientMessage, Outbound, ServerMessage};
pub use session::{Flow, Session};
pub use websocket::{SubscriptionServer, start_websocket_server};

#[cfg(test)]
mod tests;
