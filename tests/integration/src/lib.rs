//! Integration tests for the agent orchestrator
//!
//! This crate runs the full orchestrator (discovery, routing, HTTP surface)
//! against mock ACP, A2A and MCP agents served by wiremock:
//! - API endpoint testing
//! - Discovery and registry refresh
//! - End-to-end routing with fallback and circuit breaking

pub mod helpers;
pub mod mock_agents;

// Re-export commonly used items
pub use helpers::*;
pub use mock_agents::*;

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod discovery_tests;
#[cfg(test)]
mod e2e_tests;
