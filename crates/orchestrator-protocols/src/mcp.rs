//! MCP (Model Context Protocol) client.
//!
//! Tools become `tool:<name>` capabilities and resources become
//! `resource:<name>`. Execution calls the agent's first tool through
//! JSON-RPC `tools/call`.

use async_trait::async_trait;
use orchestrator_core::{
    Agent, AgentDescriptor, AgentStatus, Capability, OrchestratorError, OrchestratorResult,
    ProtocolClient, ProtocolType,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::capability::{list_or_wrapped, parse_entries};
use crate::http::{join, HttpReply, HttpTransport};
use crate::jsonrpc::{collect_text, JsonRpcRequest, JsonRpcResponse};

const TOOL_PREFIX: &str = "tool:";
const RESOURCE_PREFIX: &str = "resource:";

/// MCP protocol client
#[derive(Debug, Clone)]
pub struct McpClient {
    http: HttpTransport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    protocol_version: Option<String>,
}

impl McpClient {
    /// Create a new MCP client
    #[must_use]
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }

    /// Fetch `path`; `Ok(None)` when the agent answered with a non-2xx status
    async fn fetch(&self, endpoint: &str, path: &str) -> OrchestratorResult<Option<HttpReply>> {
        let reply = self.http.get(&join(endpoint, path)).await?;
        if reply.is_success() {
            Ok(Some(reply))
        } else {
            debug!(endpoint = %endpoint, path = path, status = reply.status, "MCP endpoint not available");
            Ok(None)
        }
    }

    fn tool_name(agent: &Agent) -> &str {
        agent
            .capabilities
            .iter()
            .find_map(|c| c.name.strip_prefix(TOOL_PREFIX))
            .unwrap_or("query")
    }
}

#[async_trait]
impl ProtocolClient for McpClient {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::Mcp
    }

    #[instrument(skip(self), fields(protocol = "mcp"))]
    async fn probe(&self, endpoint: &str) -> OrchestratorResult<AgentDescriptor> {
        let (tools, resources, info) = tokio::join!(
            self.fetch(endpoint, "/tools"),
            self.fetch(endpoint, "/resources"),
            self.fetch(endpoint, "/"),
        );

        // Unreachable on all three paths means the endpoint is down
        if let (Err(e), Err(_), Err(_)) = (&tools, &resources, &info) {
            return Err(OrchestratorError::discovery(endpoint, e.to_string()));
        }

        let mut capabilities = Vec::new();
        let mut tool_count = 0;
        let mut resource_count = 0;

        if let Ok(Some(reply)) = &tools {
            let items = list_or_wrapped(&reply.body, "tools").unwrap_or_default();
            for entry in parse_entries(&items) {
                if let Some(cap) = entry.into_capability(
                    TOOL_PREFIX,
                    |name| format!("MCP tool: {name}"),
                    &["mcp", "tool"],
                ) {
                    tool_count += 1;
                    capabilities.push(cap);
                }
            }
        }

        if let Ok(Some(reply)) = &resources {
            let items = list_or_wrapped(&reply.body, "resources").unwrap_or_default();
            for entry in parse_entries(&items) {
                if let Some(cap) = entry.into_capability(
                    RESOURCE_PREFIX,
                    |name| format!("MCP resource: {name}"),
                    &["mcp", "resource"],
                ) {
                    resource_count += 1;
                    capabilities.push(cap);
                }
            }
        }

        if capabilities.is_empty() {
            capabilities.push(
                Capability::new("mcp-server", "MCP server with unknown tools/resources")?
                    .with_tags(["mcp", "generic"]),
            );
        }

        let info: ServerInfo = match &info {
            Ok(Some(reply)) => reply.json().unwrap_or_default(),
            _ => ServerInfo::default(),
        };

        let mut metadata = Map::new();
        metadata.insert("discovery_method".into(), json!("mcp_native"));
        metadata.insert("tools_count".into(), json!(tool_count));
        metadata.insert("resources_count".into(), json!(resource_count));
        if let Some(version) = &info.protocol_version {
            metadata.insert("mcp_version".into(), json!(version));
        }

        Ok(AgentDescriptor {
            name: info.name,
            description: info.description,
            version: info.version,
            capabilities,
            metadata,
        })
    }

    async fn health_check(&self, agent: &Agent) -> AgentStatus {
        let mut reachable = false;
        for probe_path in ["/health", "/tools", "/"] {
            match self.http.get(&join(&agent.endpoint, probe_path)).await {
                Ok(reply) if reply.is_success() => return AgentStatus::Healthy,
                Ok(_) => reachable = true,
                Err(_) => {}
            }
        }
        if reachable {
            AgentStatus::Unhealthy
        } else {
            debug!(agent_id = %agent.agent_id, "MCP agent unreachable");
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
        let tool = Self::tool_name(agent);
        let request = JsonRpcRequest::new(
            "tools/call",
            json!({
                "name": tool,
                "arguments": {
                    "query": query,
                    "context": context.cloned().unwrap_or(Value::Null),
                },
            }),
        );

        let reply = self
            .http
            .post_json(&join(&agent.endpoint, "/"), &request, timeout)
            .await?
            .ensure_success(agent)?;
        let result = reply.json::<JsonRpcResponse>()?.into_result(agent)?;

        let text = collect_text(&result);
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(OrchestratorError::agent(
                &agent.agent_id,
                format!("tool '{tool}' failed: {text}"),
                None,
                false,
            ));
        }

        Ok(json!({
            "tool": tool,
            "text": text,
            "raw": result,
        }))
    }
}
