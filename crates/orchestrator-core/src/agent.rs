//! Agent and capability records.
//!
//! An [`Agent`] is produced by discovery, stored in the registry and read by
//! routing. Records are replaced wholesale on every refresh and never patched
//! in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{AgentStatus, ProtocolType, Schema};

/// A named operation an agent can perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name, never empty
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Input schema, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Schema>,

    /// Output schema, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Schema>,

    /// Example invocations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Capability {
    /// Create a capability
    ///
    /// # Errors
    /// Returns error if `name` is empty after trimming
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> OrchestratorResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(OrchestratorError::invalid_request(
                "capability name must not be empty",
            ));
        }
        Ok(Self {
            name,
            description: description.into(),
            input_schema: None,
            output_schema: None,
            examples: Vec::new(),
            tags: Vec::new(),
        })
    }

    /// Set the input schema
    #[must_use]
    pub fn with_input_schema(mut self, schema: Option<Schema>) -> Self {
        self.input_schema = schema.filter(|s| !s.is_null());
        self
    }

    /// Set the output schema
    #[must_use]
    pub fn with_output_schema(mut self, schema: Option<Schema>) -> Self {
        self.output_schema = schema.filter(|s| !s.is_null());
        self
    }

    /// Set examples
    #[must_use]
    pub fn with_examples(mut self, examples: Vec<Value>) -> Self {
        self.examples = examples;
        self
    }

    /// Add tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Case-insensitive name comparison
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

/// What a protocol probe learned about an endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentDescriptor {
    /// Self-reported name
    pub name: Option<String>,
    /// Self-reported description
    pub description: Option<String>,
    /// Self-reported version
    pub version: Option<String>,
    /// Capabilities, in the order the agent listed them
    pub capabilities: Vec<Capability>,
    /// Protocol-specific details
    pub metadata: Map<String, Value>,
}

/// A statically configured endpoint to discover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    /// Base URL of the agent
    pub url: String,

    /// Protocol hint
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolType,

    /// Name hint, used when the agent does not report one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Capability names to assume when the agent cannot be probed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    /// Version hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Container the agent runs in, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

fn default_protocol() -> ProtocolType {
    ProtocolType::Custom
}

impl AgentEndpoint {
    /// Create an endpoint with a protocol hint
    pub fn new(protocol: ProtocolType, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol,
            name: None,
            capabilities: Vec::new(),
            version: None,
            container_id: None,
        }
    }

    /// Set the name hint
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the fallback capability names
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// The configured name, or one derived from the URL host and port
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        let without_scheme = self
            .base_url()
            .split_once("://")
            .map_or(self.base_url(), |(_, rest)| rest);
        let host = without_scheme.split('/').next().unwrap_or(without_scheme);
        host.replace(':', "-")
    }
}

/// A discovered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier, derived from protocol and name
    pub agent_id: String,

    /// Display name
    pub name: String,

    /// Wire protocol
    pub protocol: ProtocolType,

    /// Base URL
    pub endpoint: String,

    /// Capabilities, in discovery order
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Current health
    #[serde(default)]
    pub status: AgentStatus,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// When this record was first discovered
    pub discovered_at: DateTime<Utc>,

    /// When health was last checked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,

    /// Container identifier, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    /// Agent version, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Agent {
    /// Create an agent with a derived identifier and no capabilities
    pub fn new(protocol: ProtocolType, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            agent_id: Self::derive_id(protocol, &name),
            name,
            protocol,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            capabilities: Vec::new(),
            status: AgentStatus::Unknown,
            metadata: Map::new(),
            discovered_at: Utc::now(),
            last_health_check: None,
            container_id: None,
            version: None,
        }
    }

    /// Derive the stable identifier for a protocol and name.
    ///
    /// `(A2a, "Math Agent")` becomes `a2a-math-agent`. A name already carrying
    /// the protocol prefix is not prefixed twice.
    #[must_use]
    pub fn derive_id(protocol: ProtocolType, name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        let slug = if slug.is_empty() { "agent" } else { slug };

        let prefix = protocol.as_str();
        if slug.starts_with(prefix) && slug[prefix.len()..].starts_with('-') {
            slug.to_string()
        } else {
            format!("{prefix}-{slug}")
        }
    }

    /// Override the identifier
    #[must_use]
    pub fn with_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Set the status
    #[must_use]
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Append a capability
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Replace the capability list
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Insert a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the agent is currently routable
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == AgentStatus::Healthy
    }

    /// Whether the agent advertises a capability with this name
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.matches_name(name))
    }

    /// Capability names in order
    pub fn capability_names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.iter().map(|c| c.name.as_str())
    }
}
