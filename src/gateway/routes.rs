//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::broker::MessageRecord;
use crate::gateway::error::AppError;
use crate::gateway::service::Gateway;

/// Body of `POST /messages`.
#[derive(Debug, Deserialize, Serialize)]
pub struct SendMessage {
    pub user: String,
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subscribers: usize,
}

/// Create the router with all routes.
pub fn create_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/messages", get(list_messages).post(send_message))
        .with_state(gateway)
}

async fn health_check(State(gateway): State<Arc<Gateway>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: gateway.hub().subscriber_count(crate::broker::MESSAGE_SENT),
    })
}

// Log access may flush to disk, so it runs on the blocking pool.

async fn list_messages(
    State(gateway): State<Arc<Gateway>>,
) -> Result<Json<Vec<MessageRecord>>, AppError> {
    let records = tokio::task::spawn_blocking(move || gateway.handle_read()).await??;
    Ok(Json(records))
}

async fn send_message(
    State(gateway): State<Arc<Gateway>>,
    Json(body): Json<SendMessage>,
) -> Result<Json<MessageRecord>, AppError> {
    let record =
        tokio::task::spawn_blocking(move || gateway.handle_append(&body.user, &body.text))
            .await??;
    Ok(Json(record))
}
