//! Capability oracle abstraction.
//!
//! An oracle sees a structured description of each candidate agent and
//! returns a confidence-ranked list with a justification. It never sees the
//! registry itself.

use async_trait::async_trait;
use orchestrator_core::{Agent, OrchestratorResult, ProtocolType, Schema};
use serde::Serialize;
use serde_json::Value;

/// What an oracle is told about one capability
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityProfile {
    /// Capability name
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Tags
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Input schema, verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Schema>,
    /// Output schema, verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Schema>,
    /// Example invocations
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

/// What an oracle is told about one agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    /// Agent identifier the oracle must answer with
    pub agent_id: String,
    /// Display name
    pub name: String,
    /// Wire protocol
    pub protocol: ProtocolType,
    /// Self-reported description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capabilities in discovery order
    pub capabilities: Vec<CapabilityProfile>,
}

impl AgentProfile {
    /// Describe an agent
    #[must_use]
    pub fn from_agent(agent: &Agent) -> Self {
        Self {
            agent_id: agent.agent_id.clone(),
            name: agent.name.clone(),
            protocol: agent.protocol,
            description: agent
                .metadata
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            capabilities: agent
                .capabilities
                .iter()
                .map(|c| CapabilityProfile {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    tags: c.tags.clone(),
                    input_schema: c.input_schema.clone(),
                    output_schema: c.output_schema.clone(),
                    examples: c.examples.clone(),
                })
                .collect(),
        }
    }
}

/// One ranked agent
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    /// Agent identifier
    pub agent_id: String,
    /// Confidence, 0.0 to 1.0
    pub confidence: f64,
}

impl RankedCandidate {
    /// Create a candidate, clamping the confidence
    pub fn new(agent_id: impl Into<String>, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            agent_id: agent_id.into(),
            confidence,
        }
    }
}

/// Oracle output
#[derive(Debug, Clone, Default)]
pub struct OracleRanking {
    /// Candidates; order is not significant, the decision maker sorts
    pub candidates: Vec<RankedCandidate>,
    /// Justification for the top choice
    pub reasoning: String,
}

/// Ranks agents for a query
#[async_trait]
pub trait CapabilityOracle: Send + Sync {
    /// Short name recorded on decisions
    fn name(&self) -> &str;

    /// Rank `agents` for `query`.
    ///
    /// Implementations only return identifiers present in `agents`.
    async fn rank(
        &self,
        query: &str,
        context: Option<&Value>,
        agents: &[AgentProfile],
    ) -> OrchestratorResult<OracleRanking>;
}
