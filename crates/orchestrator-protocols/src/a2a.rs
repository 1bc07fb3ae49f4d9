//! A2A (Agent-to-Agent) client.
//!
//! Discovery reads the agent card at `/.well-known/agent-card.json`; each
//! skill becomes a capability. Execution is a JSON-RPC 2.0 `message/send`
//! call posted to the agent's base URL.

use async_trait::async_trait;
use orchestrator_core::{
    Agent, AgentDescriptor, AgentStatus, OrchestratorError, OrchestratorResult, ProtocolClient,
    ProtocolType,
};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::capability::parse_entries;
use crate::http::{join, HttpTransport};
use crate::jsonrpc::{collect_text, JsonRpcRequest, JsonRpcResponse};

/// Well-known path of the agent card
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// A2A protocol client
#[derive(Debug, Clone)]
pub struct A2aClient {
    http: HttpTransport,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentCard {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    protocol_version: Option<String>,
    #[serde(default)]
    skills: Vec<Box<RawValue>>,
    #[serde(default)]
    capabilities: Option<Value>,
    #[serde(default)]
    default_input_modes: Vec<String>,
    #[serde(default)]
    default_output_modes: Vec<String>,
}

impl A2aClient {
    /// Create a new A2A client
    #[must_use]
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }

    fn message_params(query: &str, context: Option<&Value>) -> Value {
        let mut params = json!({
            "message": {
                "kind": "message",
                "role": "user",
                "messageId": Uuid::new_v4().to_string(),
                "parts": [{"kind": "text", "text": query}],
            }
        });
        if let Some(context) = context {
            params["metadata"] = json!({ "context": context });
        }
        params
    }
}

#[async_trait]
impl ProtocolClient for A2aClient {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::A2a
    }

    #[instrument(skip(self), fields(protocol = "a2a"))]
    async fn probe(&self, endpoint: &str) -> OrchestratorResult<AgentDescriptor> {
        let reply = self.http.get(&join(endpoint, AGENT_CARD_PATH)).await?;
        if !reply.is_success() {
            return Err(OrchestratorError::discovery(
                endpoint,
                format!("agent card returned {}", reply.status),
            ));
        }
        let card: AgentCard = reply.json()?;

        let capabilities: Vec<_> = parse_entries(&card.skills)
            .into_iter()
            .filter_map(|skill| {
                skill.into_capability("", |name| format!("A2A skill: {name}"), &["a2a", "skill"])
            })
            .collect();

        let mut metadata = Map::new();
        metadata.insert("discovery_method".into(), json!("agent_card"));
        metadata.insert(
            "a2a_version".into(),
            json!(card.protocol_version.as_deref().unwrap_or("unknown")),
        );
        if let Some(flags) = card.capabilities.filter(Value::is_object) {
            metadata.insert("a2a_capabilities".into(), flags);
        }
        if !card.default_input_modes.is_empty() {
            metadata.insert("input_modes".into(), json!(card.default_input_modes));
        }
        if !card.default_output_modes.is_empty() {
            metadata.insert("output_modes".into(), json!(card.default_output_modes));
        }

        Ok(AgentDescriptor {
            name: card.name,
            description: card.description,
            version: card.version,
            capabilities,
            metadata,
        })
    }

    async fn health_check(&self, agent: &Agent) -> AgentStatus {
        let mut reachable = false;
        for probe_path in [AGENT_CARD_PATH, "/health"] {
            match self.http.get(&join(&agent.endpoint, probe_path)).await {
                Ok(reply) if reply.is_success() => return AgentStatus::Healthy,
                Ok(_) => reachable = true,
                Err(e) => {
                    debug!(agent_id = %agent.agent_id, path = probe_path, error = %e, "A2A health probe failed");
                }
            }
        }
        if reachable {
            AgentStatus::Unhealthy
        } else {
            AgentStatus::Unknown
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
        let request = JsonRpcRequest::new("message/send", Self::message_params(query, context));
        let reply = self
            .http
            .post_json(&join(&agent.endpoint, "/"), &request, timeout)
            .await?
            .ensure_success(agent)?;

        let response: JsonRpcResponse = reply.json()?;
        let result = response.into_result(agent)?;
        Ok(json!({
            "text": collect_text(&result),
            "raw": result,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> A2aClient {
        A2aClient::new(HttpTransport::with_defaults().unwrap())
    }

    #[tokio::test]
    async fn test_probe_reads_agent_card() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(AGENT_CARD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                    "name": "math",
                    "description": "Math agent",
                    "version": "1.2.0",
                    "protocolVersion": "0.3.0",
                    "capabilities": {"streaming": false},
                    "skills": [
                        {"id": "arithmetic", "name": "arithmetic", "description": "Basic arithmetic",
                         "tags": ["math"], "examples": ["What is 2+2?"],
                         "input_schema": {"type": "object", "properties": {"expression": {"type": "string"}}}}
                    ]
                }"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let desc = client().probe(&server.uri()).await.unwrap();
        assert_eq!(desc.name.as_deref(), Some("math"));
        assert_eq!(desc.version.as_deref(), Some("1.2.0"));
        let skill = &desc.capabilities[0];
        assert_eq!(skill.name, "arithmetic");
        assert_eq!(skill.tags, vec!["a2a", "skill", "math"]);
        assert_eq!(
            skill.input_schema.as_ref().unwrap().as_str(),
            r#"{"type": "object", "properties": {"expression": {"type": "string"}}}"#
        );
        assert_eq!(desc.metadata["a2a_version"], "0.3.0");
    }

    #[tokio::test]
    async fn test_health_falls_back_to_health_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(AGENT_CARD_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let agent = Agent::new(ProtocolType::A2a, "math", server.uri());
        assert_eq!(client().health_check(&agent).await, AgentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_execute_sends_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "message/send",
                "params": {"message": {"role": "user", "parts": [{"kind": "text", "text": "What is 2+2?"}]}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "result": {"kind": "message", "role": "agent", "parts": [{"kind": "text", "text": "4"}]}
            })))
            .mount(&server)
            .await;

        let agent = Agent::new(ProtocolType::A2a, "math", server.uri());
        let out = client()
            .execute(&agent, "What is 2+2?", None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(out["text"], "4");
        assert_eq!(out["raw"]["role"], "agent");
    }
}
