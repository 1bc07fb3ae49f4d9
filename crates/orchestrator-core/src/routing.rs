//! Routing request, decision and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::agent::Agent;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::ProtocolType;

/// Upper bound accepted for a caller-supplied timeout
const MAX_TIMEOUT_SECONDS: f64 = 300.0;

/// Incoming request to route to an agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// Natural-language query
    pub query: String,

    /// Opaque context forwarded to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Restrict candidates to one protocol when possible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_protocol: Option<ProtocolType>,

    /// Agent to promote when it is a viable candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_agent: Option<String>,

    /// Overall deadline for decision plus execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
}

impl RoutingRequest {
    /// Create a request for a query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Set the context
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the preferred protocol
    #[must_use]
    pub fn with_preferred_protocol(mut self, protocol: ProtocolType) -> Self {
        self.preferred_protocol = Some(protocol);
        self
    }

    /// Set the preferred agent
    #[must_use]
    pub fn with_preferred_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.preferred_agent = Some(agent_id.into());
        self
    }

    /// Set the overall timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    /// Validate the request
    ///
    /// # Errors
    /// Returns error if the query is blank or the timeout is out of range
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.query.trim().is_empty() {
            return Err(OrchestratorError::invalid_request("query must not be empty"));
        }
        if let Some(secs) = self.timeout_seconds {
            if !secs.is_finite() || secs <= 0.0 || secs > MAX_TIMEOUT_SECONDS {
                return Err(OrchestratorError::invalid_request(format!(
                    "timeout_seconds must be in (0, {MAX_TIMEOUT_SECONDS}]"
                )));
            }
        }
        Ok(())
    }

    /// The requested deadline, if any
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| Duration::from_secs_f64(s.min(MAX_TIMEOUT_SECONDS)))
    }
}

/// Outcome of matching a query against the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Request this decision belongs to
    pub request_id: String,

    /// Chosen agent; `None` means no suitable agent, and `error` is then set
    pub selected_agent: Option<Agent>,

    /// Confidence in the selection, 0.0 to 1.0
    pub confidence: f64,

    /// Human-readable justification
    pub reasoning: String,

    /// Fallback candidates, best first, excluding the selected agent
    #[serde(default)]
    pub alternative_agents: Vec<Agent>,

    /// Why nothing was selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time spent deciding
    #[serde(default)]
    pub decision_time_ms: u64,

    /// Oracle that produced the ranking
    #[serde(default)]
    pub oracle: String,
}

impl RoutingDecision {
    /// A decision that selected an agent
    pub fn selected(
        request_id: impl Into<String>,
        agent: Agent,
        confidence: f64,
        reasoning: impl Into<String>,
        alternatives: Vec<Agent>,
    ) -> Self {
        let alternative_agents = alternatives
            .into_iter()
            .filter(|a| a.agent_id != agent.agent_id)
            .collect();
        Self {
            request_id: request_id.into(),
            selected_agent: Some(agent),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            alternative_agents,
            error: None,
            decision_time_ms: 0,
            oracle: String::new(),
        }
    }

    /// A decision that selected nothing; an empty error is replaced with a generic one
    pub fn none(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "no suitable agent".to_string();
        }
        Self {
            request_id: request_id.into(),
            selected_agent: None,
            confidence: 0.0,
            reasoning: error.clone(),
            alternative_agents: Vec::new(),
            error: Some(error),
            decision_time_ms: 0,
            oracle: String::new(),
        }
    }

    /// Record how long the decision took
    #[must_use]
    pub fn with_timing(mut self, elapsed: Duration) -> Self {
        self.decision_time_ms = elapsed.as_millis() as u64;
        self
    }

    /// Record the oracle name
    #[must_use]
    pub fn with_oracle(mut self, oracle: impl Into<String>) -> Self {
        self.oracle = oracle.into();
        self
    }

    /// Selected agent followed by the alternatives, in the order to try them
    pub fn candidates(&self) -> impl Iterator<Item = &Agent> {
        self.selected_agent.iter().chain(self.alternative_agents.iter())
    }
}

/// Normalized response returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Request identifier
    pub request_id: String,

    /// Agent that answered, or the last one tried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Protocol of that agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolType>,

    /// Opaque payload from the agent
    #[serde(default)]
    pub response_data: Value,

    /// Total time spent on the request
    pub duration_ms: u64,

    /// Whether an agent answered successfully
    pub success: bool,

    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Routing details
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// When the response was produced
    pub timestamp: DateTime<Utc>,
}

impl AgentResponse {
    /// A successful response from an agent
    pub fn success(
        request_id: impl Into<String>,
        agent: &Agent,
        response_data: Value,
        duration: Duration,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            agent_id: Some(agent.agent_id.clone()),
            protocol: Some(agent.protocol),
            response_data,
            duration_ms: duration.as_millis() as u64,
            success: true,
            error: None,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// A failed response
    pub fn failure(
        request_id: impl Into<String>,
        agent: Option<&Agent>,
        error: &OrchestratorError,
        duration: Duration,
    ) -> Self {
        let mut metadata = Map::new();
        metadata.insert("error_type".into(), Value::from(error.error_type()));
        Self {
            request_id: request_id.into(),
            agent_id: agent.map(|a| a.agent_id.clone()),
            protocol: agent.map(|a| a.protocol),
            response_data: Value::Null,
            duration_ms: duration.as_millis() as u64,
            success: false,
            error: Some(error.to_string()),
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Insert a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Generate a new request identifier
#[must_use]
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
