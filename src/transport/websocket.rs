//! WebSocket transport
//!
//! This file implements the subscription endpoint. Responsibilities:
//! - Accept TCP/WebSocket connections on the configured path only
//! - Create a `Session` for each connection and feed it the peer's frames
//! - Own the socket sink in a single writer task fed by a bounded channel
//! - Close every connection with 1001 when the shutdown signal fires
//!
//! Hub cleanup does not depend on how a connection ends: the session is
//! closed (and dropped) on every exit path of `handle_connection`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_hdr_async;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tungstenite::http::{HeaderValue, StatusCode};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::broker::Hub;
use crate::config::{ServerSettings, SessionSettings};
use crate::transport::message::{Outbound, SUBPROTOCOL};
use crate::transport::session::{Flow, Session};

/// How long a closing connection may spend flushing queued frames.
const WRITER_GRACE: Duration = Duration::from_secs(5);
/// How long to wait for room in the outbound queue for the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub struct SubscriptionServer {
    hub: Arc<Hub>,
    settings: SessionSettings,
    path: String,
}

impl SubscriptionServer {
    pub fn new(hub: Arc<Hub>, settings: SessionSettings, path: impl Into<String>) -> Self {
        Self {
            hub,
            settings,
            path: path.into(),
        }
    }

    /// Accept connections until `shutdown` turns true.
    pub async fn run(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        let server = Arc::new(self);
        match listener.local_addr() {
            Ok(addr) => info!("Subscriptions ready at ws://{addr}{}", server.path),
            Err(e) => warn!("subscription listener has no local address: {e}"),
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = server.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream, peer, shutdown).await;
                        });
                    }
                    Err(e) => warn!("failed to accept connection: {e}"),
                },
                _ = shutdown_requested(&mut shutdown) => {
                    info!("subscription endpoint shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let ws_stream = match accept_hdr_async(stream, |request: &Request, response: Response| {
            negotiate(&self.path, request, response)
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                warn!(%peer, "WebSocket handshake error: {e}");
                return;
            }
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<Outbound>(self.settings.outbound_capacity.max(1));
        let mut session = Session::new(self.hub.clone(), tx, self.settings.buffer_capacity);
        let session_id = session.id().to_string();
        info!(session = %session_id, %peer, "connection opened");

        let writer = {
            let session_id = session_id.clone();
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    let closing = matches!(frame, Outbound::Close { .. });
                    let msg = match encode(frame) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(session = %session_id, "failed to serialize frame: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(msg).await {
                        warn!(session = %session_id, "Failed to send message: {e}");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
                debug!(session = %session_id, "send loop closed");
            })
        };

        let closing = loop {
            tokio::select! {
                incoming = ws_receiver.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        // a reply may wait on a peer that stopped reading
                        tokio::select! {
                            flow = session.handle_text(&text) => {
                                if let Flow::Close { code, reason } = flow {
                                    break Some((code, reason));
                                }
                            }
                            _ = shutdown_requested(&mut shutdown) => break Some(going_away()),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break None,
                    // ping/pong are answered by tungstenite; binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session = %session_id, "read error: {e}");
                        break None;
                    }
                },
                _ = shutdown_requested(&mut shutdown) => break Some(going_away()),
            }
        };

        // release hub state before anything that waits on the peer
        session.close();

        if let Some((code, reason)) = closing {
            warn!(session = %session_id, code, "closing connection: {reason}");
            if tokio::time::timeout(CLOSE_GRACE, session.send_close(code, reason))
                .await
                .is_err()
            {
                debug!(session = %session_id, "close frame not queued, peer is not reading");
            }
        }
        drop(session);

        // the writer exits once queued frames are flushed and every sender is gone
        let abort = writer.abort_handle();
        if tokio::time::timeout(WRITER_GRACE, writer).await.is_err() {
            debug!(session = %session_id, "writer did not drain in time, aborting");
            abort.abort();
        }
        info!(session = %session_id, "disconnected");
    }
}

/// Bind `settings.ws_addr()` and serve subscriptions until `shutdown` fires.
pub async fn start_websocket_server(
    hub: Arc<Hub>,
    server: &ServerSettings,
    session: SessionSettings,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(server.ws_addr()).await?;
    SubscriptionServer::new(hub, session, server.ws_path.clone())
        .run(listener, shutdown)
        .await;
    Ok(())
}

/// Accept the upgrade only on `path`, echoing the sub-protocol when offered.
pub fn negotiate(
    path: &str,
    request: &Request,
    mut response: Response,
) -> Result<Response, ErrorResponse> {
    if request.uri().path() != path {
        let mut rejection = ErrorResponse::new(Some(format!(
            "no subscription endpoint at {}",
            request.uri().path()
        )));
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        return Err(rejection);
    }

    let offered = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == SUBPROTOCOL);
    if offered {
        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    }
    Ok(response)
}

fn encode(frame: Outbound) -> Result<WsMessage, serde_json::Error> {
    Ok(match frame {
        Outbound::Message(msg) => WsMessage::text(serde_json::to_string(&msg)?),
        Outbound::Close { code, reason } => WsMessage::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    })
}

fn going_away() -> (u16, String) {
    (u16::from(CloseCode::Away), "Server shutting down".to_string())
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let sender_gone = shutdown.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}
