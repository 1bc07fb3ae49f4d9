//! # Orchestrator Protocols
//!
//! Protocol client implementations for the agent orchestrator:
//! - ACP (capabilities + schema documents, `/invoke` execution)
//! - A2A (agent cards, JSON-RPC `message/send`)
//! - MCP (tools and resources, JSON-RPC `tools/call`)
//! - Generic HTTP fallback for custom agents
//!
//! All clients share one pooled [`HttpTransport`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod generic;
pub mod http;
pub mod jsonrpc;

#[cfg(feature = "acp")]
pub mod acp;

#[cfg(feature = "a2a")]
pub mod a2a;

#[cfg(feature = "mcp")]
pub mod mcp;

use std::sync::Arc;

use orchestrator_core::{ClientRegistry, OrchestratorResult};

// Re-export main types
pub use generic::GenericClient;
pub use http::{HttpConfig, HttpReply, HttpTransport};

#[cfg(feature = "acp")]
pub use acp::AcpClient;

#[cfg(feature = "a2a")]
pub use a2a::A2aClient;

#[cfg(feature = "mcp")]
pub use mcp::McpClient;

/// Build a client registry with every enabled protocol sharing one transport
///
/// # Errors
/// Returns error if the HTTP client cannot be created
pub fn default_clients(config: HttpConfig) -> OrchestratorResult<ClientRegistry> {
    let transport = HttpTransport::new(config)?;
    let mut registry = ClientRegistry::new();

    registry.register(Arc::new(GenericClient::new(transport.clone())));
    #[cfg(feature = "acp")]
    registry.register(Arc::new(AcpClient::new(transport.clone())));
    #[cfg(feature = "a2a")]
    registry.register(Arc::new(A2aClient::new(transport.clone())));
    #[cfg(feature = "mcp")]
    registry.register(Arc::new(McpClient::new(transport)));

    Ok(registry)
}
