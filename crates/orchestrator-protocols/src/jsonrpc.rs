//! Minimal JSON-RPC 2.0 envelope used by A2A and MCP.

use orchestrator_core::{Agent, OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    /// Always "2.0"
    pub jsonrpc: &'static str,
    /// Request identifier
    pub id: String,
    /// Method name
    pub method: &'a str,
    /// Parameters
    pub params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    /// Create a request with a fresh identifier
    #[must_use]
    pub fn new(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Uuid::new_v4().to_string(),
            method,
            params,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    #[serde(default)]
    pub message: String,
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Result on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error on failure
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Take the result, turning a JSON-RPC error into an agent error
    ///
    /// # Errors
    /// Returns an agent error for an `error` member, or a protocol error if
    /// neither member is present
    pub fn into_result(self, agent: &Agent) -> OrchestratorResult<Value> {
        if let Some(error) = self.error {
            // -32603 is an internal error on the agent side
            let retryable = error.code == -32603;
            return Err(OrchestratorError::agent(
                &agent.agent_id,
                format!("JSON-RPC error {}: {}", error.code, error.message),
                None,
                retryable,
            ));
        }
        self.result
            .ok_or_else(|| OrchestratorError::protocol("JSON-RPC response has no result"))
    }
}

/// Concatenate the text of every `{"kind"|"type": "text", "text": ...}` part
/// found in the usual places of an A2A or MCP result.
#[must_use]
pub fn collect_text(result: &Value) -> String {
    let mut texts = Vec::new();
    let mut visit_parts = |parts: Option<&Value>| {
        if let Some(parts) = parts.and_then(Value::as_array) {
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    texts.push(text.to_string());
                }
            }
        }
    };

    visit_parts(result.get("parts"));
    visit_parts(result.get("content"));
    visit_parts(result.pointer("/message/parts"));
    visit_parts(result.pointer("/status/message/parts"));
    if let Some(artifacts) = result.get("artifacts").and_then(Value::as_array) {
        for artifact in artifacts {
            visit_parts(artifact.get("parts"));
        }
    }

    texts.join("\n")
}
