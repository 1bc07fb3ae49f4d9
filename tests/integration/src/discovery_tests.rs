//! Discovery integration tests
//!
//! Probe real (mock) agents over HTTP and check what lands in the registry.

use crate::helpers::*;
use crate::mock_agents::*;
use orchestrator_core::{AgentEndpoint, AgentStatus, ProtocolType};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_discovers_every_protocol() {
    let math = a2a_math_agent("4").await;
    let hello = acp_hello_agent().await;
    let files = mcp_files_agent().await;

    let server = TestServer::start(vec![
        endpoint(ProtocolType::A2a, "math", &math.uri()),
        endpoint(ProtocolType::Acp, "hello", &hello.uri()),
        endpoint(ProtocolType::Mcp, "files", &files.uri()),
    ])
    .await;

    let snapshot = server.registry.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().all(|a| a.status == AgentStatus::Healthy));

    let math_agent = snapshot.get("a2a-math").unwrap();
    assert_eq!(math_agent.name, "Math Agent");
    assert_eq!(math_agent.version.as_deref(), Some("1.0.0"));
    assert!(math_agent.has_capability("arithmetic"));

    let files_agent = snapshot.get("mcp-files").unwrap();
    let names: Vec<_> = files_agent.capability_names().collect();
    assert_eq!(names, vec!["tool:read_file", "resource:workspace"]);
    assert_eq!(files_agent.version.as_deref(), Some("0.4.0"));
}

#[tokio::test]
async fn test_schemas_survive_discovery() {
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![endpoint(ProtocolType::Acp, "hello", &hello.uri())]).await;

    let body = TestServer::json_body(server.get("/agents/acp-hello").await).await;
    let greeting = &body["capabilities"][0];
    assert_eq!(greeting["name"], json!("greeting"));
    assert_eq!(
        greeting["input_schema"],
        json!({"type": "object", "properties": {"name": {"type": "string"}}})
    );
    assert_eq!(
        greeting["output_schema"]["properties"]["message"]["type"],
        json!("string")
    );
}

#[tokio::test]
async fn test_unreachable_endpoint_is_kept_as_unknown() {
    let math = a2a_math_agent("4").await;
    let offline = AgentEndpoint::new(ProtocolType::Acp, "http://127.0.0.1:1")
        .with_name("translator")
        .with_capabilities(["translation"]);

    let server = TestServer::start(vec![endpoint(ProtocolType::A2a, "math", &math.uri()), offline]).await;

    let agent = server.registry.get("acp-translator").unwrap();
    assert_eq!(agent.status, AgentStatus::Unknown);
    assert!(agent.has_capability("translation"));
    assert_eq!(agent.metadata["discovery_method"], json!("fallback"));

    let body = TestServer::json_body(server.get("/agents?status=unknown").await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Unknown agents are never routed to
    let body = server.route("translate hello into French").await;
    assert_ne!(body["agent_id"], json!("acp-translator"));
}

#[tokio::test]
async fn test_refresh_picks_up_health_change() {
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![endpoint(ProtocolType::Acp, "hello", &hello.uri())]).await;
    assert_eq!(server.registry.get("acp-hello").unwrap().status, AgentStatus::Healthy);
    let generation = server.registry.snapshot().generation();

    hello.reset().await;
    mount_acp_discovery(&hello, "degraded").await;

    let response = server.post_json("/agents/refresh", &json!({})).await;
    assert_status(&response, 202);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["status"], json!("refresh_triggered"));

    let registry = server.registry.clone();
    assert!(
        eventually(|| registry.snapshot().generation() > generation).await,
        "refresh never published"
    );
    assert_eq!(registry.get("acp-hello").unwrap().status, AgentStatus::Degraded);
}

#[tokio::test]
async fn test_failing_health_check_marks_agent_unhealthy() {
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![endpoint(ProtocolType::Acp, "hello", &hello.uri())]).await;

    hello.reset().await;
    Mock::given(method("GET"))
        .and(path("/capabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"capabilities": ["greeting"]})))
        .mount(&hello)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&hello)
        .await;

    server.scheduler.run_cycle().await;

    let agent = server.registry.get("acp-hello").unwrap();
    assert_eq!(agent.status, AgentStatus::Unhealthy);

    let body = server.route("Hello!").await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["metadata"]["error_type"], json!("no_healthy_agents"));
}
