//! The `gateway` module is the producer-side entry point.
//!
//! `Gateway` reads history straight from the durable log and, on append,
//! writes to the log first and only then publishes the stored event to the
//! hub. `routes` exposes both operations over HTTP with `axum`.

pub mod error;
pub mod routes;
pub mod service;

pub use error::AppError;
pub use routes::create_router;
pub use service::Gateway;
