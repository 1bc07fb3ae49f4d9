//! Mock agents for integration tests
//!
//! Each function starts a wiremock server that speaks one agent protocol
//! well enough to be discovered, health checked and executed against.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A2A math agent: agent card with an arithmetic skill, answers `message/send`
pub async fn a2a_math_agent(answer: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/.well-known/agent-card.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Math Agent",
            "description": "Performs arithmetic",
            "version": "1.0.0",
            "protocolVersion": "0.3.0",
            "skills": [
                {
                    "id": "arithmetic",
                    "name": "arithmetic",
                    "description": "Basic arithmetic operations",
                    "tags": ["math", "calculator"],
                    "examples": ["What is 2+2?"]
                }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "message/send"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {
                "kind": "message",
                "role": "agent",
                "parts": [{"kind": "text", "text": answer}]
            }
        })))
        .mount(&server)
        .await;

    server
}

/// ACP hello agent: greeting capability, healthy, answers `/invoke`
pub async fn acp_hello_agent() -> MockServer {
    let server = MockServer::start().await;
    mount_acp_discovery(&server, "healthy").await;

    Mock::given(method("POST"))
        .and(path("/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": {"message": "Hello! Nice to meet you."}
        })))
        .mount(&server)
        .await;

    server
}

/// ACP greeting agent whose `/invoke` always fails with the given status
pub async fn failing_acp_agent(status: u16) -> MockServer {
    let server = MockServer::start().await;
    mount_acp_discovery(&server, "healthy").await;

    Mock::given(method("POST"))
        .and(path("/invoke"))
        .respond_with(ResponseTemplate::new(status).set_body_string("agent exploded"))
        .mount(&server)
        .await;

    server
}

/// Mount ACP discovery endpoints reporting `health` from `/health`
pub async fn mount_acp_discovery(server: &MockServer, health: &str) {
    Mock::given(method("GET"))
        .and(path("/capabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Hello Agent",
            "description": "Friendly greetings",
            "capabilities": [
                {"name": "greeting", "description": "Greets people in many languages"}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "input": {"type": "object", "properties": {"name": {"type": "string"}}},
            "output": {"type": "object", "properties": {"message": {"type": "string"}}}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": health})))
        .mount(server)
        .await;
}

/// MCP file server with one tool and one resource
pub async fn mcp_files_agent() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tools": [
                {
                    "name": "read_file",
                    "description": "Read a file from disk",
                    "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
                }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "workspace", "description": "Project files"}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "files", "version": "0.4.0"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    server
}
