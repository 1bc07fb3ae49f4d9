//! Error types for the orchestrator.

use thiserror::Error;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while discovering, routing to, or calling agents
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// Probing a single endpoint failed
    #[error("Discovery failed for {endpoint}: {message}")]
    Discovery {
        /// Endpoint that was probed
        endpoint: String,
        /// Failure description
        message: String,
    },

    /// Registry is empty or every agent is unhealthy
    #[error("no healthy agents available")]
    NoHealthyAgents,

    /// Oracle found nothing above the confidence floor
    #[error("No suitable agent: {reason}")]
    NoSuitableAgent {
        /// Why no candidate qualified
        reason: String,
    },

    /// Downstream circuit breaker is open
    #[error("Circuit breaker open for agent {agent_id}")]
    CircuitOpen {
        /// Agent whose breaker rejected the call
        agent_id: String,
    },

    /// Every retry against one agent failed
    #[error("Retries exhausted for agent {agent_id} after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Agent that was retried
        agent_id: String,
        /// Number of attempts made
        attempts: u32,
        /// The last error encountered
        last_error: Box<OrchestratorError>,
    },

    /// Every candidate agent, including alternatives, failed
    #[error("All agents failed ({}): {last_error}", attempted.join(", "))]
    AllAgentsFailed {
        /// Agents tried, in order
        attempted: Vec<String>,
        /// The last error encountered
        last_error: String,
    },

    /// Agent answered with an error
    #[error("Agent {agent_id} error: {message}")]
    Agent {
        /// Agent that returned the error
        agent_id: String,
        /// Error message
        message: String,
        /// HTTP status, when the failure was an HTTP response
        status_code: Option<u16>,
        /// Whether the same call may succeed if repeated
        retryable: bool,
    },

    /// Connection or transport level failure
    #[error("Transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// A single call exceeded its timeout
    #[error("Request timed out after {duration_ms}ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds
        duration_ms: u64,
    },

    /// The overall routing deadline ran out
    #[error("Routing deadline of {budget_ms}ms exceeded")]
    DeadlineExceeded {
        /// Total budget, in milliseconds
        budget_ms: u64,
    },

    /// Malformed request from the caller
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error message
        message: String,
    },

    /// Response did not follow the expected wire format
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Capability oracle failed
    #[error("Oracle error: {message}")]
    Oracle {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl OrchestratorError {
    /// Create a discovery error
    pub fn discovery(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a no-suitable-agent error
    pub fn no_suitable_agent(reason: impl Into<String>) -> Self {
        Self::NoSuitableAgent {
            reason: reason.into(),
        }
    }

    /// Create a circuit-open error
    pub fn circuit_open(agent_id: impl Into<String>) -> Self {
        Self::CircuitOpen {
            agent_id: agent_id.into(),
        }
    }

    /// Create a retry-exhausted error
    pub fn retry_exhausted(agent_id: impl Into<String>, attempts: u32, last_error: Self) -> Self {
        Self::RetryExhausted {
            agent_id: agent_id.into(),
            attempts,
            last_error: Box::new(last_error),
        }
    }

    /// Create an all-agents-failed error
    pub fn all_agents_failed(attempted: Vec<String>, last_error: impl Into<String>) -> Self {
        Self::AllAgentsFailed {
            attempted,
            last_error: last_error.into(),
        }
    }

    /// Create an agent error
    pub fn agent(
        agent_id: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Agent {
            agent_id: agent_id.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create an agent error from an HTTP status; 5xx and 429 are retryable
    pub fn agent_http(agent_id: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let retryable = status >= 500 || status == 429;
        Self::agent(agent_id, message, Some(status), retryable)
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a deadline-exceeded error
    pub fn deadline_exceeded(budget: std::time::Duration) -> Self {
        Self::DeadlineExceeded {
            budget_ms: budget.as_millis() as u64,
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an oracle error
    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Agent { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Check if the error reflects on the health of the downstream agent.
    ///
    /// Caller mistakes and breaker rejections are not held against the agent.
    pub fn counts_as_failure(&self) -> bool {
        match self {
            Self::InvalidRequest { .. }
            | Self::CircuitOpen { .. }
            | Self::DeadlineExceeded { .. }
            | Self::Configuration { .. } => false,
            Self::Agent {
                status_code: Some(status),
                retryable: false,
                ..
            } => !(400..500).contains(status) || *status == 408,
            _ => true,
        }
    }

    /// Short machine-readable error type
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Discovery { .. } => "discovery_error",
            Self::NoHealthyAgents => "no_healthy_agents",
            Self::NoSuitableAgent { .. } => "no_suitable_agent",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::AllAgentsFailed { .. } => "all_agents_failed",
            Self::Agent { .. } => "agent_error",
            Self::Transport { .. } => "transport_error",
            Self::Timeout { .. } => "timeout",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Protocol { .. } => "protocol_error",
            Self::Oracle { .. } => "oracle_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_retryable() {
        assert!(OrchestratorError::transport("connection refused").is_retryable());
        assert!(OrchestratorError::timeout(Duration::from_secs(5)).is_retryable());
        assert!(OrchestratorError::agent_http("a2a-math", 503, "unavailable").is_retryable());
        assert!(OrchestratorError::agent_http("a2a-math", 429, "slow down").is_retryable());
        assert!(!OrchestratorError::agent_http("a2a-math", 400, "bad input").is_retryable());
        assert!(!OrchestratorError::invalid_request("empty query").is_retryable());
        assert!(!OrchestratorError::circuit_open("a2a-math").is_retryable());
        assert!(!OrchestratorError::protocol("bad json").is_retryable());
    }

    #[test]
    fn test_client_errors_do_not_count_against_agent() {
        assert!(!OrchestratorError::agent_http("x", 404, "nope").counts_as_failure());
        assert!(!OrchestratorError::invalid_request("empty").counts_as_failure());
        assert!(OrchestratorError::agent_http("x", 500, "boom").counts_as_failure());
        assert!(OrchestratorError::transport("reset").counts_as_failure());
        assert!(OrchestratorError::protocol("garbage").counts_as_failure());
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::all_agents_failed(
            vec!["a".into(), "b".into()],
            "Agent b error: boom",
        );
        assert_eq!(err.to_string(), "All agents failed (a, b): Agent b error: boom");
        assert_eq!(err.error_type(), "all_agents_failed");

        let err = OrchestratorError::retry_exhausted(
            "a",
            4,
            OrchestratorError::transport("refused"),
        );
        assert!(err.to_string().contains("after 4 attempts"));
        assert!(!err.is_retryable());
    }
}
