//! HTTP API tests
//!
//! Exercise every endpoint of a running orchestrator.

use crate::helpers::*;
use crate::mock_agents::*;
use orchestrator_core::ProtocolType;
use pretty_assertions::assert_eq;
use serde_json::json;

async fn two_agent_server() -> (TestServer, wiremock::MockServer, wiremock::MockServer) {
    let math = a2a_math_agent("4").await;
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![
        endpoint(ProtocolType::A2a, "math", &math.uri()),
        endpoint(ProtocolType::Acp, "hello", &hello.uri()),
    ])
    .await;
    (server, math, hello)
}

#[tokio::test]
async fn test_health_is_healthy_with_running_discovery() {
    let (server, _math, _hello) = two_agent_server().await;

    let response = server.get("/health").await;
    assert_status(&response, 200);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["components"]["discovery"]["status"], json!("healthy"));
    assert_eq!(body["components"]["agents"]["status"], json!("healthy"));
    assert_eq!(body["components"]["oracle"]["message"], json!("keyword"));
}

#[tokio::test]
async fn test_health_degraded_without_agents() {
    let server = TestServer::start(Vec::new()).await;

    let body = TestServer::json_body(server.get("/health").await).await;
    assert_eq!(body["status"], json!("degraded"));
}

#[tokio::test]
async fn test_list_and_get_agents() {
    let (server, _math, _hello) = two_agent_server().await;

    let body = TestServer::json_body(server.get("/agents").await).await;
    let mut ids: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["agent_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a2a-math", "acp-hello"]);

    let body = TestServer::json_body(server.get("/agents?protocol=a2a").await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], json!("Math Agent"));

    let response = server.get("/agents/acp-hello").await;
    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["protocol"], json!("acp"));
    assert_eq!(body["status"], json!("healthy"));
}

#[tokio::test]
async fn test_unknown_agent_is_not_found() {
    let (server, _math, _hello) = two_agent_server().await;

    let response = server.get("/agents/nobody").await;
    assert_status(&response, 404);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"]["type"], json!("not_found"));
    assert_eq!(body["error"]["status_code"], json!(404));
    assert!(body["error"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_invalid_filters_are_bad_requests() {
    let (server, _math, _hello) = two_agent_server().await;

    assert_status(&server.get("/agents?protocol=carrier-pigeon").await, 400);
    assert_status(&server.get("/agents?status=sleepy").await, 400);
}

#[tokio::test]
async fn test_route_validation() {
    let (server, _math, _hello) = two_agent_server().await;

    let response = server.post_json("/route", &json!({"query": ""})).await;
    assert_status(&response, 422);

    let response = server
        .post_json("/route", &json!({"query": "2+2", "timeout_seconds": 0}))
        .await;
    assert_status(&response, 422);

    let response = server.post_json("/route", &json!({"context": {}})).await;
    assert_status(&response, 422);

    let response = server
        .client
        .post(server.url("/route"))
        .header("content-type", "application/json")
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_status(&response, 400);
}

#[tokio::test]
async fn test_route_decision_does_not_execute() {
    let (server, math, _hello) = two_agent_server().await;

    let response = server
        .post_json("/route/decision", &json!({"query": "calculate 12 * 7"}))
        .await;
    assert_status(&response, 200);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["selected_agent"]["agent_id"], json!("a2a-math"));
    assert!(body["confidence"].as_f64().unwrap() > 0.8);

    let invocations = math
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .count();
    assert_eq!(invocations, 0);
}

#[tokio::test]
async fn test_protocols_and_capabilities() {
    let (server, _math, _hello) = two_agent_server().await;

    let body = TestServer::json_body(server.get("/protocols").await).await;
    let protocols = body.as_array().unwrap();
    assert_eq!(protocols.len(), 4);
    let a2a = protocols.iter().find(|p| p["name"] == json!("a2a")).unwrap();
    assert_eq!(a2a["agent_count"], json!(1));
    let mcp = protocols.iter().find(|p| p["name"] == json!("mcp")).unwrap();
    assert_eq!(mcp["agent_count"], json!(0));

    let body = TestServer::json_body(server.get("/capabilities").await).await;
    assert_eq!(body["service"], json!("agent-orchestrator"));
    assert_eq!(body["protocols"], json!(["acp", "a2a", "mcp", "custom"]));

    let body = TestServer::json_body(server.get("/agents/capabilities").await).await;
    assert_eq!(body["arithmetic"], json!(["a2a-math"]));
    assert_eq!(body["greeting"], json!(["acp-hello"]));
}

#[tokio::test]
async fn test_status_and_metrics() {
    let (server, _math, _hello) = two_agent_server().await;
    server.route("What is 2+2?").await;

    let body = TestServer::json_body(server.get("/status").await).await;
    assert_eq!(body["discovery"]["state"], json!("running"));
    assert_eq!(body["discovery"]["cycles"], json!(1));
    assert_eq!(body["registry"]["total_agents"], json!(2));
    assert_eq!(body["routing"]["successful_requests"], json!(1));

    let response = server.get("/metrics").await;
    assert_status(&response, 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("orchestrator_route_requests_total"));
    assert!(text.contains("orchestrator_agent_calls_total"));
}
