use crate::broker::{Event, Hub, MESSAGE_SENT, MessageRecord};
use crate::transport::message::{ClientMessage, Outbound, ServerMessage};
use crate::transport::session::{Flow, Session};
use crate::transport::websocket::negotiate;
use crate::utils::error::ProtocolError;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tungstenite::handshake::server::{Request, Response};
use tungstenite::http::StatusCode;

fn event(id: u64) -> Arc<Event> {
    Arc::new(Event {
        id,
        topic: MESSAGE_SENT.to_string(),
        user: "alice".to_string(),
        text: format!("message {id}"),
        timestamp: Utc::now(),
    })
}

fn session(outbound_capacity: usize, buffer_capacity: usize) -> (Session, mpsc::Receiver<Outbound>, Arc<Hub>) {
    let hub = Arc::new(Hub::new());
    let (tx, rx) = mpsc::channel(outbound_capacity);
    (Session::new(hub.clone(), tx, buffer_capacity), rx, hub)
}

async fn acknowledged(outbound_capacity: usize, buffer_capacity: usize) -> (Session, mpsc::Receiver<Outbound>, Arc<Hub>) {
    let (mut session, mut rx, hub) = session(outbound_capacity, buffer_capacity);
    let init = json!({"type": "connection_init"}).to_string();
    assert_eq!(session.handle_text(&init).await, Flow::Continue);
    assert_eq!(rx.recv().await, Some(Outbound::Message(ServerMessage::ConnectionAck)));
    (session, rx, hub)
}

async fn next_frame(rx: &mut mpsc::Receiver<Outbound>) -> Outbound {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outbound channel closed")
}

async fn assert_silent(rx: &mut mpsc::Receiver<Outbound>) {
    let frame = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(frame.is_err(), "unexpected frame: {frame:?}");
}

#[test]
fn client_messages_parse_with_defaults_and_aliases() {
    let start: ClientMessage = serde_json::from_value(json!({"type": "start", "id": "1"})).unwrap();
    assert_eq!(
        start,
        ClientMessage::Start {
            id: "1".into(),
            topic: MESSAGE_SENT.into()
        }
    );

    let subscribe: ClientMessage =
        serde_json::from_value(json!({"type": "subscribe", "id": "2", "topic": "OTHER"})).unwrap();
    assert_eq!(
        subscribe,
        ClientMessage::Start {
            id: "2".into(),
            topic: "OTHER".into()
        }
    );

    let complete: ClientMessage =
        serde_json::from_value(json!({"type": "complete", "id": "2"})).unwrap();
    assert_eq!(complete, ClientMessage::Stop { id: "2".into() });
}

#[test]
fn next_frame_serializes_record_payload() {
    let frame = ServerMessage::Next {
        id: "7".into(),
        payload: MessageRecord {
            id: 1,
            user: "alice".into(),
            text: "hi".into(),
            timestamp: "2025-01-01T00:00:00.000Z".into(),
        },
    };
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["type"], "next");
    assert_eq!(value["id"], "7");
    assert_eq!(value["payload"]["user"], "alice");
    assert_eq!(value["payload"]["id"], 1);
}

#[test]
fn only_errors_with_close_codes_become_close_flows() {
    assert_eq!(
        Flow::try_from(ProtocolError::NotAcknowledged),
        Ok(Flow::Close {
            code: 4401,
            reason: "Unauthorized".into()
        })
    );
    assert_eq!(
        Flow::try_from(ProtocolError::DuplicateOperation("1".into())),
        Err(ProtocolError::DuplicateOperation("1".into()))
    );
}

#[tokio::test]
async fn test_handle_connection_init() {
    let (session, _rx, _hub) = acknowledged(8, 8).await;
    assert!(session.is_acknowledged());
}

#[tokio::test]
async fn second_connection_init_closes_with_4429() {
    let (mut session, _rx, _hub) = acknowledged(8, 8).await;
    let init = json!({"type": "connection_init"}).to_string();
    assert_eq!(
        session.handle_text(&init).await,
        Flow::Close {
            code: 4429,
            reason: "Too many initialisation requests".into()
        }
    );
}

#[tokio::test]
async fn start_before_init_closes_with_4401() {
    let (mut session, _rx, hub) = session(8, 8);
    let start = json!({"type": "start", "id": "1"}).to_string();
    assert_eq!(
        session.handle_text(&start).await,
        Flow::Close {
            code: 4401,
            reason: "Unauthorized".into()
        }
    );
    assert_eq!(hub.subscriber_count(MESSAGE_SENT), 0);
}

#[tokio::test]
async fn invalid_frame_closes_with_4400() {
    let (mut session, _rx, _hub) = acknowledged(8, 8).await;
    assert_eq!(
        session.handle_text("{not json").await,
        Flow::Close {
            code: 4400,
            reason: "Invalid message received".into()
        }
    );
}

#[tokio::test]
async fn test_handle_ping() {
    let (mut session, mut rx, _hub) = session(8, 8);
    assert_eq!(session.handle(ClientMessage::Ping).await, Flow::Continue);
    assert_eq!(next_frame(&mut rx).await, Outbound::Message(ServerMessage::Pong));
}

#[tokio::test]
async fn test_handle_start_delivers_next_frames() {
    let (mut session, mut rx, hub) = acknowledged(8, 8).await;
    let start = json!({"type": "start", "id": "op-1"}).to_string();
    assert_eq!(session.handle_text(&start).await, Flow::Continue);
    assert!(session.is_active("op-1"));
    assert_eq!(hub.subscriber_count(MESSAGE_SENT), 1);

    hub.publish(MESSAGE_SENT, event(1));
    hub.publish(MESSAGE_SENT, event(2));

    for expected in [1, 2] {
        match next_frame(&mut rx).await {
            Outbound::Message(ServerMessage::Next { id, payload }) => {
                assert_eq!(id, "op-1");
                assert_eq!(payload.id, expected);
            }
            other => panic!("Expected a next frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn duplicate_start_is_rejected_and_first_stays_active() {
    let (mut session, mut rx, hub) = acknowledged(8, 8).await;
    let start = json!({"type": "start", "id": "1"}).to_string();
    assert_eq!(session.handle_text(&start).await, Flow::Continue);
    assert_eq!(session.handle_text(&start).await, Flow::Continue);

    assert_eq!(
        next_frame(&mut rx).await,
        Outbound::Message(ServerMessage::Error {
            id: Some("1".into()),
            message: "Subscriber for 1 already exists".into()
        })
    );
    assert!(session.is_active("1"));
    assert_eq!(hub.subscriber_count(MESSAGE_SENT), 1);

    // the surviving subscription still delivers
    hub.publish(MESSAGE_SENT, event(9));
    assert!(matches!(
        next_frame(&mut rx).await,
        Outbound::Message(ServerMessage::Next { payload, .. }) if payload.id == 9
    ));
}

#[tokio::test]
async fn start_returns_duplicate_operation_error() {
    let (mut session, _rx, _hub) = acknowledged(8, 8).await;
    session.start("a".into(), MESSAGE_SENT).unwrap();
    assert_eq!(
        session.start("a".into(), MESSAGE_SENT),
        Err(ProtocolError::DuplicateOperation("a".into()))
    );
}

#[tokio::test]
async fn test_handle_stop_releases_registration_and_id() {
    let (mut session, mut rx, hub) = acknowledged(8, 8).await;
    session.start("1".into(), MESSAGE_SENT).unwrap();

    let stop = json!({"type": "stop", "id": "1"}).to_string();
    assert_eq!(session.handle_text(&stop).await, Flow::Continue);
    assert!(!session.is_active("1"));
    assert_eq!(hub.subscriber_count(MESSAGE_SENT), 0);

    assert_eq!(hub.publish(MESSAGE_SENT, event(1)), 0);
    assert_silent(&mut rx).await;

    // the id is free again
    session.start("1".into(), MESSAGE_SENT).unwrap();
    assert_eq!(hub.subscriber_count(MESSAGE_SENT), 1);
}

#[tokio::test]
async fn stop_of_unknown_operation_is_a_noop() {
    let (mut session, mut rx, _hub) = acknowledged(8, 8).await;
    assert!(!session.stop("never-started"));
    let stop = json!({"type": "stop", "id": "never-started"}).to_string();
    assert_eq!(session.handle_text(&stop).await, Flow::Continue);
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn stop_discards_buffered_events() {
    let (mut session, mut rx, hub) = acknowledged(8, 8).await;
    session.start("1".into(), MESSAGE_SENT).unwrap();

    // the forwarder has not run yet, so these are still buffered
    hub.publish(MESSAGE_SENT, event(1));
    hub.publish(MESSAGE_SENT, event(2));
    session.stop("1");

    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn close_removes_every_registration() {
    let (mut session, mut rx, hub) = acknowledged(8, 8).await;
    for id in ["a", "b", "c"] {
        session.start(id.into(), MESSAGE_SENT).unwrap();
    }
    session.start("d".into(), "OTHER").unwrap();
    assert_eq!(hub.subscriber_count(MESSAGE_SENT), 3);

    session.close();
    assert_eq!(session.active_operations(), 0);
    assert_eq!(hub.topic_count(), 0);
    assert_eq!(hub.publish(MESSAGE_SENT, event(1)), 0);
    assert_silent(&mut rx).await;

    // closing again changes nothing
    session.close();
}

#[tokio::test]
async fn dropping_session_cleans_up_hub() {
    let (mut session, _rx, hub) = acknowledged(8, 8).await;
    session.start("a".into(), MESSAGE_SENT).unwrap();
    session.start("b".into(), MESSAGE_SENT).unwrap();

    drop(session);
    assert_eq!(hub.subscriber_count(MESSAGE_SENT), 0);
}

#[tokio::test]
async fn slow_connection_drops_oldest_buffered_events() {
    // nobody reads the outbound channel while events are published
    let (mut session, mut rx, hub) = acknowledged(1, 2).await;
    session.start("1".into(), MESSAGE_SENT).unwrap();

    for id in 1..=10 {
        hub.publish(MESSAGE_SENT, event(id));
    }

    let mut received = Vec::new();
    for _ in 0..2 {
        match next_frame(&mut rx).await {
            Outbound::Message(ServerMessage::Next { payload, .. }) => received.push(payload.id),
            other => panic!("Expected a next frame, got {other:?}"),
        }
    }
    assert_eq!(received, vec![9, 10]);
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn send_close_queues_close_frame() {
    let (session, mut rx, _hub) = session(8, 8);
    session.send_close(1001, "Server shutting down").await;
    assert_eq!(
        next_frame(&mut rx).await,
        Outbound::Close {
            code: 1001,
            reason: "Server shutting down".into()
        }
    );
}

#[test]
fn negotiate_rejects_unknown_path() {
    let request = Request::builder().uri("/elsewhere").body(()).unwrap();
    let rejection = negotiate("/graphql", &request, Response::new(())).unwrap_err();
    assert_eq!(rejection.status(), StatusCode::NOT_FOUND);
}

#[test]
fn negotiate_echoes_offered_subprotocol() {
    let request = Request::builder()
        .uri("/graphql")
        .header("Sec-WebSocket-Protocol", "graphql-ws, graphql-transport-ws")
        .body(())
        .unwrap();
    let response = negotiate("/graphql", &request, Response::new(())).unwrap();
    assert_eq!(
        response.headers().get("Sec-WebSocket-Protocol").unwrap(),
        "graphql-transport-ws"
    );

    let plain = Request::builder().uri("/graphql").body(()).unwrap();
    let response = negotiate("/graphql", &plain, Response::new(())).unwrap();
    assert!(response.headers().get("Sec-WebSocket-Protocol").is_none());
}
