//! Shared enums and newtypes.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;

use crate::error::OrchestratorError;

/// Wire protocol spoken by an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Agent Communication Protocol
    Acp,
    /// Agent-to-Agent protocol (JSON-RPC with agent cards)
    A2a,
    /// Model Context Protocol
    Mcp,
    /// Unknown protocol, handled by the generic client
    Custom,
}

impl ProtocolType {
    /// All protocols the orchestrator knows how to speak
    pub const ALL: [Self; 4] = [Self::Acp, Self::A2a, Self::Mcp, Self::Custom];

    /// Get the protocol as its wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Acp => "acp",
            Self::A2a => "a2a",
            Self::Mcp => "mcp",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acp" => Ok(Self::Acp),
            "a2a" => Ok(Self::A2a),
            "mcp" => Ok(Self::Mcp),
            "custom" | "generic" => Ok(Self::Custom),
            other => Err(OrchestratorError::invalid_request(format!(
                "unknown protocol '{other}'"
            ))),
        }
    }
}

/// Health status of a discovered agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent responds and reports itself healthy
    Healthy,
    /// Agent responds but reports reduced service
    Degraded,
    /// Agent is failing or unreachable after a successful discovery
    Unhealthy,
    /// Agent has not been verified yet
    #[default]
    Unknown,
}

impl AgentStatus {
    /// Get the status as its wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }

    /// Map a self-reported health string onto a status.
    ///
    /// Unrecognised non-empty values count as healthy: the agent answered.
    #[must_use]
    pub fn from_reported(reported: &str) -> Self {
        match reported.trim().to_ascii_lowercase().as_str() {
            "" => Self::Unknown,
            "healthy" | "ok" | "up" => Self::Healthy,
            "degraded" | "warning" => Self::Degraded,
            "unhealthy" | "error" | "critical" | "down" => Self::Unhealthy,
            _ => Self::Healthy,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "unhealthy" => Ok(Self::Unhealthy),
            "unknown" => Ok(Self::Unknown),
            other => Err(OrchestratorError::invalid_request(format!(
                "unknown agent status '{other}'"
            ))),
        }
    }
}

/// Opaque structured-data schema attached to a capability.
///
/// The orchestrator never interprets a schema. It keeps the exact JSON text
/// received at discovery time and writes it back out unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Box<RawValue>);

impl Schema {
    /// Wrap raw JSON text, checking only that it is well formed
    ///
    /// # Errors
    /// Returns error if `json` is not valid JSON
    pub fn from_json(json: impl Into<String>) -> Result<Self, OrchestratorError> {
        RawValue::from_string(json.into())
            .map(Self)
            .map_err(|e| OrchestratorError::protocol(format!("invalid schema JSON: {e}")))
    }

    /// Wrap an already-captured raw value
    #[must_use]
    pub fn from_raw(raw: Box<RawValue>) -> Self {
        Self(raw)
    }

    /// Build a schema from a parsed value
    ///
    /// # Errors
    /// Returns error if the value cannot be serialized
    pub fn from_value(value: &serde_json::Value) -> Result<Self, OrchestratorError> {
        serde_json::value::to_raw_value(value)
            .map(Self)
            .map_err(|e| OrchestratorError::internal(format!("schema serialization: {e}")))
    }

    /// The schema text exactly as received
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Whether the schema is a JSON `null`
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.as_str().trim() == "null"
    }

    /// Parse the schema into a value, for consumers that want to inspect it
    ///
    /// # Errors
    /// Returns error if the stored text no longer parses
    pub fn to_value(&self) -> Result<serde_json::Value, OrchestratorError> {
        serde_json::from_str(self.as_str())
            .map_err(|e| OrchestratorError::internal(format!("schema parse: {e}")))
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_round_trip_names() {
        for protocol in ProtocolType::ALL {
            assert_eq!(protocol.as_str().parse::<ProtocolType>().unwrap(), protocol);
        }
        assert_eq!("generic".parse::<ProtocolType>().unwrap(), ProtocolType::Custom);
        assert!("smtp".parse::<ProtocolType>().is_err());
    }

    #[test]
    fn test_protocol_serde_lowercase() {
        let json = serde_json::to_string(&ProtocolType::A2a).unwrap();
        assert_eq!(json, "\"a2a\"");
    }

    #[test]
    fn test_status_from_reported() {
        assert_eq!(AgentStatus::from_reported("healthy"), AgentStatus::Healthy);
        assert_eq!(AgentStatus::from_reported("Warning"), AgentStatus::Degraded);
        assert_eq!(AgentStatus::from_reported("critical"), AgentStatus::Unhealthy);
        assert_eq!(AgentStatus::from_reported("starting"), AgentStatus::Healthy);
        assert_eq!(AgentStatus::from_reported(""), AgentStatus::Unknown);
    }

    #[test]
    fn test_schema_preserves_exact_text() {
        let text = r#"{ "type":"object",  "properties": {"a": {"type": "number"}} }"#;
        let schema = Schema::from_json(text).unwrap();
        assert_eq!(schema.as_str(), text);

        #[derive(Serialize, Deserialize)]
        struct Holder {
            schema: Schema,
        }
        let doc = format!(r#"{{"schema":{text}}}"#);
        let holder: Holder = serde_json::from_str(&doc).unwrap();
        assert_eq!(holder.schema.as_str(), text);
        assert_eq!(serde_json::to_string(&holder).unwrap(), doc);
    }

    #[test]
    fn test_schema_rejects_invalid_json() {
        assert!(Schema::from_json("{not json").is_err());
    }
}
