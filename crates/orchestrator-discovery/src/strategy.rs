//! Discovery strategies.
//!
//! A strategy turns a configured endpoint into an [`Agent`]. When the agent
//! cannot be probed, [`DiscoveryStrategy::fallback`] builds a minimal record
//! from the endpoint's static hints with status `UNKNOWN`, so a briefly
//! unreachable endpoint stays visible instead of vanishing.

use async_trait::async_trait;
use chrono::Utc;
use orchestrator_core::{
    Agent, AgentEndpoint, AgentStatus, Capability, ClientRegistry, OrchestratorResult,
    ProtocolClient, ProtocolType,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Turns a raw endpoint into an agent record
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// Protocol this strategy handles
    fn protocol(&self) -> ProtocolType;

    /// Probe the endpoint and build a full agent record
    async fn discover(&self, endpoint: &AgentEndpoint) -> OrchestratorResult<Agent>;

    /// Minimal agent built from static hints when probing failed
    fn fallback(&self, endpoint: &AgentEndpoint, reason: &str) -> Agent {
        fallback_agent(self.protocol(), endpoint, reason)
    }
}

/// Build a label-based agent record with status `UNKNOWN`
#[must_use]
pub fn fallback_agent(protocol: ProtocolType, endpoint: &AgentEndpoint, reason: &str) -> Agent {
    let mut capabilities = label_capabilities(protocol, endpoint);
    if capabilities.is_empty() {
        if let Ok(cap) = Capability::new(
            "unknown",
            format!("{} agent with unknown capabilities", protocol.as_str().to_uppercase()),
        ) {
            capabilities.push(cap.with_tags([protocol.as_str(), "fallback"]));
        }
    }

    let name = endpoint.display_name();
    let mut agent = Agent::new(protocol, &name, endpoint.base_url())
        .with_capabilities(capabilities)
        .with_status(AgentStatus::Unknown)
        .with_metadata("discovery_method", "fallback")
        .with_metadata("fallback_reason", reason);
    agent.version.clone_from(&endpoint.version);
    agent.container_id.clone_from(&endpoint.container_id);
    agent
}

fn label_capabilities(protocol: ProtocolType, endpoint: &AgentEndpoint) -> Vec<Capability> {
    let upper = protocol.as_str().to_uppercase();
    endpoint
        .capabilities
        .iter()
        .filter_map(|name| {
            Capability::new(name.as_str(), format!("{upper} capability: {}", name.trim()))
                .ok()
                .map(|cap| cap.with_tags([protocol.as_str(), "label-fallback"]))
        })
        .collect()
}

/// Strategy backed by a protocol client: probe, then health check
pub struct ClientDiscoveryStrategy {
    client: Arc<dyn ProtocolClient>,
}

impl ClientDiscoveryStrategy {
    /// Wrap a protocol client
    #[must_use]
    pub fn new(client: Arc<dyn ProtocolClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscoveryStrategy for ClientDiscoveryStrategy {
    fn protocol(&self) -> ProtocolType {
        self.client.protocol()
    }

    async fn discover(&self, endpoint: &AgentEndpoint) -> OrchestratorResult<Agent> {
        let protocol = self.protocol();
        let descriptor = self.client.probe(endpoint.base_url()).await?;

        // The identifier follows the configured name so that it stays stable
        // whether or not the agent could be probed.
        let id_name = endpoint.display_name();
        let name = descriptor
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id_name.clone());

        let mut capabilities = descriptor.capabilities;
        if capabilities.is_empty() {
            capabilities = label_capabilities(protocol, endpoint);
        }

        let mut agent = Agent::new(protocol, &id_name, endpoint.base_url())
            .with_capabilities(capabilities);
        agent.name = name;
        agent.metadata = descriptor.metadata;
        if let Some(description) = descriptor.description {
            agent.metadata.insert("description".into(), json!(description));
        }
        agent.version = descriptor.version.or_else(|| endpoint.version.clone());
        agent.container_id.clone_from(&endpoint.container_id);

        agent.status = self.client.health_check(&agent).await;
        agent.last_health_check = Some(Utc::now());

        debug!(
            agent_id = %agent.agent_id,
            protocol = %protocol,
            status = %agent.status,
            capabilities = agent.capabilities.len(),
            "Discovered agent"
        );
        Ok(agent)
    }
}

/// Strategies keyed by protocol
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: HashMap<ProtocolType, Arc<dyn DiscoveryStrategy>>,
}

impl StrategySet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One client-backed strategy per registered protocol client
    #[must_use]
    pub fn from_clients(clients: &ClientRegistry) -> Self {
        let mut set = Self::new();
        for protocol in clients.protocols() {
            if let Ok(client) = clients.get(protocol) {
                set.register(Arc::new(ClientDiscoveryStrategy::new(client)));
            }
        }
        set
    }

    /// Register a strategy under its protocol
    pub fn register(&mut self, strategy: Arc<dyn DiscoveryStrategy>) {
        self.strategies.insert(strategy.protocol(), strategy);
    }

    /// Register a strategy, builder style
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn DiscoveryStrategy>) -> Self {
        self.register(strategy);
        self
    }

    /// Strategy for a protocol, falling back to the custom one
    pub fn get(&self, protocol: ProtocolType) -> Option<Arc<dyn DiscoveryStrategy>> {
        self.strategies
            .get(&protocol)
            .or_else(|| self.strategies.get(&ProtocolType::Custom))
            .cloned()
    }
}
