//! # Orchestrator Telemetry
//!
//! Observability for the agent orchestrator:
//! - Structured logging through `tracing-subscriber` (pretty or JSON)
//! - Optional OpenTelemetry span export
//! - Prometheus metrics for routing, agent calls and discovery

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;
pub mod tracing_setup;

// Re-export main types
pub use metrics::{MetricsError, OrchestratorMetrics};
pub use tracing_setup::{init_tracing, shutdown_tracing, TracingConfig, TracingError};
