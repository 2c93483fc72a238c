//! CLI for Chatwire
//!
//! Subcommands:
//! - `serve`: run the HTTP gateway and the subscription endpoint (default)
//! - `watch`: subscribe to the message stream and print every new message

use std::sync::Arc;

use chatwire::broker::{Hub, MESSAGE_SENT};
use chatwire::config::load_config;
use chatwire::gateway::{Gateway, create_router};
use chatwire::persistence::SledLog;
use chatwire::transport::message::{ClientMessage, ServerMessage};
use chatwire::transport::start_websocket_server;
use chatwire::utils::logging;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "chatwire", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway and the WebSocket subscription endpoint
    Serve,
    /// Subscribe to new messages and print them as they arrive
    Watch {
        /// Subscription endpoint URL
        #[arg(long, default_value = "ws://127.0.0.1:5006/graphql")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(e) = run_server().await {
                // configuration errors surface before logging is set up
                logging::init("info");
                error!("Server failed: {}", e);
            }
        }
        Command::Watch { url } => {
            logging::init("warn");
            if let Err(e) = run_watch(&url).await {
                error!("Watch failed: {}", e);
            }
        }
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init(&config.log.level);

    let log = Arc::new(SledLog::open(&config.storage)?);
    info!(path = %config.storage.path, stored = log.len(), "message log opened");

    let hub = Arc::new(Hub::new());
    let gateway = Arc::new(Gateway::new(log, hub.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = TcpListener::bind(config.server.http_addr()).await?;
    info!("Gateway listening on http://{}", listener.local_addr()?);
    let http = {
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = create_router(gateway);
            let graceful = async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {e}");
            }
        })
    };

    let ws = {
        let server = config.server.clone();
        let session = config.session.clone();
        tokio::spawn(async move {
            if let Err(e) = start_websocket_server(hub, &server, session, shutdown_rx).await {
                error!("WebSocket server error: {e}");
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully.");
    if shutdown_tx.send(true).is_err() {
        warn!("no listener left to notify of shutdown");
    }

    let _ = tokio::join!(http, ws);
    Ok(())
}

async fn run_watch(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;

    let init = serde_json::to_string(&ClientMessage::ConnectionInit { payload: None })?;
    ws_stream.send(WsMessage::Text(init.into())).await?;

    let start = serde_json::to_string(&ClientMessage::Start {
        id: "1".to_string(),
        topic: MESSAGE_SENT.to_string(),
    })?;
    let mut started = false;

    while let Some(frame) = ws_stream.next().await {
        let text = match frame? {
            WsMessage::Text(text) => text,
            WsMessage::Close(reason) => {
                println!("Connection closed: {reason:?}");
                break;
            }
            _ => continue,
        };

        match serde_json::from_str::<ServerMessage>(&text)? {
            ServerMessage::ConnectionAck if !started => {
                ws_stream.send(WsMessage::Text(start.clone().into())).await?;
                started = true;
            }
            ServerMessage::Next { payload, .. } => {
                println!("[{}] #{} {}: {}", payload.timestamp, payload.id, payload.user, payload.text);
            }
            ServerMessage::Error { message, .. } => eprintln!("Server error: {message}"),
            _ => {}
        }
    }

    Ok(())
}
