//! Generic HTTP client for agents of unknown protocol.

use async_trait::async_trait;
use orchestrator_core::{
    Agent, AgentDescriptor, AgentStatus, OrchestratorError, OrchestratorResult, ProtocolClient,
    ProtocolType,
};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::capability::parse_entries;
use crate::http::{join, HttpTransport};

/// Fallback client: `GET /` to describe, `GET /health`, `POST /execute`
#[derive(Debug, Clone)]
pub struct GenericClient {
    http: HttpTransport,
}

#[derive(Debug, Default, Deserialize)]
struct RootDoc {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    capabilities: Vec<Box<RawValue>>,
}

impl GenericClient {
    /// Create a new generic client
    #[must_use]
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProtocolClient for GenericClient {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::Custom
    }

    async fn probe(&self, endpoint: &str) -> OrchestratorResult<AgentDescriptor> {
        let reply = self.http.get(&join(endpoint, "/")).await?;
        if !reply.is_success() {
            return Err(OrchestratorError::discovery(
                endpoint,
                format!("GET / returned {}", reply.status),
            ));
        }

        // A non-JSON root page still proves the agent exists
        let doc: RootDoc = reply.json().unwrap_or_default();
        let capabilities = parse_entries(&doc.capabilities)
            .into_iter()
            .filter_map(|e| e.into_capability("", |name| format!("Capability: {name}"), &["generic"]))
            .collect();

        let mut metadata = Map::new();
        metadata.insert("discovery_method".into(), json!("generic_http"));

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
            Ok(reply) if reply.is_success() => AgentStatus::Healthy,
            Ok(_) => AgentStatus::Unhealthy,
            Err(e) => {
                debug!(agent_id = %agent.agent_id, error = %e, "Health check unreachable");
                AgentStatus::Unknown
            }
        }
    }

    async fn execute(
        &self,
        agent: &Agent,
        query: &str,
        context: Option<&Value>,
        timeout: Duration,
    ) -> OrchestratorResult<Value> {
        let body = json!({
            "query": query,
            "context": context.cloned().unwrap_or_else(|| json!({})),
        });
        let reply = self
            .http
            .post_json(&join(&agent.endpoint, "/execute"), &body, timeout)
            .await?
            .ensure_success(agent)?;

        match reply.json::<Value>() {
            Ok(value) => Ok(value),
            Err(_) => Ok(json!({ "text": String::from_utf8_lossy(&reply.body) })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_and_execute() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "weather",
                "capabilities": ["forecast", {"name": "alerts", "description": "Severe weather"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(200).set_body_string("sunny"))
            .mount(&server)
            .await;

        let client = GenericClient::new(HttpTransport::with_defaults().unwrap());
        let desc = client.probe(&server.uri()).await.unwrap();
        assert_eq!(desc.name.as_deref(), Some("weather"));
        assert_eq!(desc.capabilities.len(), 2);
        assert_eq!(desc.capabilities[1].description, "Severe weather");

        let agent = Agent::new(ProtocolType::Custom, "weather", server.uri());
        let out = client
            .execute(&agent, "forecast?", None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out, json!({"text": "sunny"}));
        // No /health route mounted: wiremock answers 404
        assert_eq!(client.health_check(&agent).await, AgentStatus::Unhealthy);
    }
}
