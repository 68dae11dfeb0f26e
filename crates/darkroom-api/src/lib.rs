//! Axum HTTP/WS boundary for Darkroom.
//!
//! This crate provides:
//! - REST endpoints for job submission, lookup and cancellation
//! - Queue control (concurrency, runner registry) and preset CRUD
//! - A WebSocket stream of every queue event
//! - Bounded history of finished jobs
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod history;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use history::JobHistory;
pub use routes::create_router;
pub use state::AppState;
