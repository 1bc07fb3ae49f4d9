//! ACP (Agent Communication Protocol) client.
//!
//! # Wire contract
//! - `GET {endpoint}/capabilities` → `{capabilities: [...]}` or a bare list
//! - `GET {endpoint}/schema` → `{input?, output?}`, filling schemas the
//!   capabilities lack
//! - `GET {endpoint}/health` → `{status: "healthy" | "degraded" | ...}`
//! - `POST {endpoint}/invoke` with `{input: {query, context}, stream: false}`

use async_trait::async_trait;
use orchestrator_core::{
    Agent, AgentDescriptor, AgentStatus, OrchestratorError, OrchestratorResult, ProtocolClient,
    ProtocolType, Schema,
};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::capability::{list_or_wrapped, parse_entries};
use crate::http::{join, HttpTransport};

/// ACP protocol client
#[derive(Debug, Clone)]
pub struct AcpClient {
    http: HttpTransport,
}

#[derive(Debug, Default, Deserialize)]
struct CapabilitiesDoc {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SchemaDoc {
    #[serde(default)]
    input: Option<Box<RawValue>>,
    #[serde(default)]
    output: Option<Box<RawValue>>,
    #[serde(default)]
    input_schema: Option<Box<RawValue>>,
    #[serde(default)]
    output_schema: Option<Box<RawValue>>,
}

impl SchemaDoc {
    fn input(&self) -> Option<Schema> {
        self.input
            .clone()
            .or_else(|| self.input_schema.clone())
            .map(Schema::from_raw)
            .filter(|s| !s.is_null())
    }

    fn output(&self) -> Option<Schema> {
        self.output
            .clone()
            .or_else(|| self.output_schema.clone())
            .map(Schema::from_raw)
            .filter(|s| !s.is_null())
    }
}

#[derive(Debug, Default, Deserialize)]
struct HealthDoc {
    #[serde(default)]
    status: Option<String>,
}

impl AcpClient {
    /// Create a new ACP client
    #[must_use]
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }

    async fn fetch_schema(&self, endpoint: &str) -> Option<SchemaDoc> {
        match self.http.get(&join(endpoint, "/schema")).await {
            Ok(reply) if reply.is_success() => reply.json().ok(),
            Ok(reply) => {
                debug!(endpoint = %endpoint, status = reply.status, "ACP schema not available");
                None
            }
            Err(e) => {
                debug!(endpoint = %endpoint, error = %e, "ACP schema fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl ProtocolClient for AcpClient {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::Acp
    }

    #[instrument(skip(self), fields(protocol = "acp"))]
    async fn probe(&self, endpoint: &str) -> OrchestratorResult<AgentDescriptor> {
        let reply = self.http.get(&join(endpoint, "/capabilities")).await?;
        if !reply.is_success() {
            return Err(OrchestratorError::discovery(
                endpoint,
                format!("GET /capabilities returned {}", reply.status),
            ));
        }

        let items = list_or_wrapped(&reply.body, "capabilities")?;
        let doc: CapabilitiesDoc = reply.json().unwrap_or_default();
        let mut capabilities: Vec<_> = parse_entries(&items)
            .into_iter()
            .filter_map(|entry| {
                entry.into_capability("", |name| format!("ACP capability: {name}"), &["acp"])
            })
            .collect();

        if let Some(schema) = self.fetch_schema(endpoint).await {
            let (input, output) = (schema.input(), schema.output());
            for cap in &mut capabilities {
                if cap.input_schema.is_none() {
                    cap.input_schema.clone_from(&input);
                }
                if cap.output_schema.is_none() {
                    cap.output_schema.clone_from(&output);
                }
            }
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("discovery_method".into(), json!("acp_native"));
        metadata.insert("capability_count".into(), json!(capabilities.len()));

        Ok(AgentDescriptor {
            name: doc.name,
            description: doc.description,
            version: doc.version,
            capabilities,
            metadata,
        })
    }

    async fn health_check(&self, agent: &Agent) -> AgentStatus {
        match self.http.get(&join(&agent.endpoint, "/health")).await {
            Ok(reply) if reply.is_success() => {
                let doc: HealthDoc = reply.json().unwrap_or_default();
                AgentStatus::from_reported(doc.status.as_deref().unwrap_or_default())
            }
            Ok(reply) => {
                debug!(agent_id = %agent.agent_id, status = reply.status, "ACP health check failed");
                AgentStatus::Unhealthy
            }
            Err(e) => {
                debug!(agent_id = %agent.agent_id, error = %e, "ACP health check unreachable");
                AgentStatus::Unknown
            }
        }
    }

    #[instrument(skip(self, agent, context), fields(agent_id = %agent.agent_id))]
    async fn execute(
        &self,
        agent: &Agent,
        query: &str,
        context: Option<&Value>,
        timeout: Duration,
    ) -> OrchestratorResult<Value> {
        let body = json!({
            "input": {
                "query": query,
                "context": context.cloned().unwrap_or_else(|| json!({})),
            },
            "stream": false,
        });

        let reply = self
            .http
            .post_json(&join(&agent.endpoint, "/invoke"), &body, timeout)
            .await?
            .ensure_success(agent)?;
        let mut value: Value = reply.json()?;

        let failed = value
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| matches!(s, "error" | "failed"));
        if failed {
            let message = value
                .get("error")
                .map(|e| e.as_str().map_or_else(|| e.to_string(), ToString::to_string))
                .unwrap_or_else(|| "agent reported failure".to_string());
            return Err(OrchestratorError::agent(&agent.agent_id, message, None, false));
        }

        if let Some(output) = value.get_mut("output") {
            return Ok(output.take());
        }
        Ok(value)
    }
}
