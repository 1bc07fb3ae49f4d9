//! # Orchestrator Core
//!
//! Core types, traits, and error handling for the agent orchestrator.
//!
//! This crate provides the foundational types used throughout the orchestrator:
//! - The agent data model (agents, capabilities, opaque schemas)
//! - Routing request, decision and response types
//! - The `ProtocolClient` abstraction implemented per wire protocol
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod error;
pub mod protocol;
pub mod routing;
pub mod types;

// Re-export commonly used types
pub use agent::{Agent, AgentDescriptor, AgentEndpoint, Capability};
pub use error::{OrchestratorError, OrchestratorResult};
pub use protocol::{ClientRegistry, ProtocolClient};
pub use routing::{new_request_id, AgentResponse, RoutingDecision, RoutingRequest};
pub use types::{AgentStatus, ProtocolType, Schema};
