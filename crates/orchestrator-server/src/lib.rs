//! # Orchestrator Server
//!
//! HTTP surface of the agent orchestrator.
//!
//! This crate provides:
//! - Axum router for routing, agent listing and refresh endpoints
//! - Health, status, protocol and capability descriptions
//! - Prometheus metrics exposition
//! - Uniform JSON error bodies
//! - Graceful shutdown on SIGINT/SIGTERM

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod health;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use error::ApiError;
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use routes::create_router;
pub use server::{Server, ServerError};
pub use shutdown::shutdown_signal;
pub use state::AppState;
