//! Protocol client abstraction.
//!
//! Each wire protocol (ACP, A2A, MCP, generic HTTP) gets one implementation of
//! [`ProtocolClient`]. Clients hold nothing but a pooled HTTP transport; they
//! never retry on their own, so retries and circuit breaking stay in the
//! resilience layer.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, AgentDescriptor};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{AgentStatus, ProtocolType};

/// Client for one agent wire protocol
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Protocol this client speaks
    fn protocol(&self) -> ProtocolType;

    /// Learn what the agent at `endpoint` is and what it can do
    async fn probe(&self, endpoint: &str) -> OrchestratorResult<AgentDescriptor>;

    /// Check the agent's health; never fails, unreachable agents report a status
    async fn health_check(&self, agent: &Agent) -> AgentStatus;

    /// Run one request against the agent within `timeout`, without retrying
    async fn execute(
        &self,
        agent: &Agent,
        query: &str,
        context: Option<&Value>,
        timeout: Duration,
    ) -> OrchestratorResult<Value>;
}

/// Protocol clients keyed by protocol
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<ProtocolType, Arc<dyn ProtocolClient>>,
}

impl ClientRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own protocol, replacing any previous one
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ProtocolClient>) -> Self {
        self.register(client);
        self
    }

    /// Register a client under its own protocol
    pub fn register(&mut self, client: Arc<dyn ProtocolClient>) {
        self.clients.insert(client.protocol(), client);
    }

    /// Client for a protocol, falling back to the custom client
    pub fn get(&self, protocol: ProtocolType) -> OrchestratorResult<Arc<dyn ProtocolClient>> {
        self.clients
            .get(&protocol)
            .or_else(|| self.clients.get(&ProtocolType::Custom))
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::configuration(format!("no client registered for {protocol}"))
            })
    }

    /// Protocols with a registered client
    pub fn protocols(&self) -> Vec<ProtocolType> {
        let mut protocols: Vec<_> = self.clients.keys().copied().collect();
        protocols.sort();
        protocols
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}
