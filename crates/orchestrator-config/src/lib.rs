//! # Orchestrator Config
//!
//! Typed configuration for the agent orchestrator:
//! - Sections for server, discovery, routing, resilience, oracle and telemetry
//! - Loading from YAML or TOML files with environment overrides
//! - Validation of ranges, endpoint URLs and oracle credentials

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

// Re-export main types
pub use config::{
    DiscoverySettings, OracleProvider, OracleSettings, OrchestratorConfig, ResilienceSettings,
    RoutingSettings, ServerConfig, TelemetrySettings,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::CONFIG_PATH_ENV;
