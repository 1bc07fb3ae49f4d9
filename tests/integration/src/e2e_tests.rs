//! End-to-end integration tests
//!
//! Route real queries through discovery, decision and execution against
//! mock agents, including the failure paths.

use crate::helpers::*;
use crate::mock_agents::*;
use orchestrator_core::ProtocolType;
use serde_json::json;
use wiremock::MockServer;

async fn invocations(server: &MockServer, invoke_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == invoke_path)
        .count()
}

/// E2E test: arithmetic goes to the A2A math agent
#[tokio::test]
async fn test_e2e_math_query() {
    let math = a2a_math_agent("4").await;
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![
        endpoint(ProtocolType::A2a, "math", &math.uri()),
        endpoint(ProtocolType::Acp, "hello", &hello.uri()),
    ])
    .await;

    let body = server.route("What is 2+2?").await;

    assert_eq!(body["success"], json!(true), "{body}");
    assert_eq!(body["agent_id"], json!("a2a-math"));
    assert_eq!(body["protocol"], json!("a2a"));
    assert_eq!(body["response_data"]["text"], json!("4"));
    assert_eq!(body["metadata"]["fallback_used"], json!(false));
    assert_eq!(body["metadata"]["oracle"], json!("keyword"));
    assert!(body["request_id"].is_string());
    assert_eq!(invocations(&hello, "/invoke").await, 0);
}

/// E2E test: greetings go to the ACP hello agent
#[tokio::test]
async fn test_e2e_greeting_query() {
    let math = a2a_math_agent("4").await;
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![
        endpoint(ProtocolType::A2a, "math", &math.uri()),
        endpoint(ProtocolType::Acp, "hello", &hello.uri()),
    ])
    .await;

    let response = server
        .post_json("/route", &json!({"query": "Hello there!", "context": {"user": "ada"}}))
        .await;
    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;

    assert_eq!(body["success"], json!(true), "{body}");
    assert_eq!(body["agent_id"], json!("acp-hello"));
    assert_eq!(body["response_data"]["message"], json!("Hello! Nice to meet you."));
}

/// E2E test: a preferred protocol narrows the pool
#[tokio::test]
async fn test_e2e_preferred_protocol() {
    let math = a2a_math_agent("4").await;
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![
        endpoint(ProtocolType::A2a, "math", &math.uri()),
        endpoint(ProtocolType::Acp, "hello", &hello.uri()),
    ])
    .await;

    let response = server
        .post_json(
            "/route/decision",
            &json!({"query": "hello, what is 2+2?", "preferred_protocol": "acp"}),
        )
        .await;
    let body = TestServer::json_body(response).await;
    assert_eq!(body["selected_agent"]["agent_id"], json!("acp-hello"));
    assert_eq!(body["alternative_agents"], json!([]));
}

/// E2E test: a failing agent falls back to the next candidate
#[tokio::test]
async fn test_e2e_fallback_to_alternative() {
    let broken = failing_acp_agent(500).await;
    let backup = acp_hello_agent().await;
    let server = TestServer::start(vec![
        endpoint(ProtocolType::Acp, "hello", &broken.uri()),
        endpoint(ProtocolType::Acp, "hello-backup", &backup.uri()),
    ])
    .await;

    let body = server.route("Hello!").await;

    assert_eq!(body["success"], json!(true), "{body}");
    assert_eq!(body["agent_id"], json!("acp-hello-backup"));
    assert_eq!(body["metadata"]["fallback_used"], json!(true));
    assert_eq!(body["metadata"]["tried_agents"], json!(["acp-hello", "acp-hello-backup"]));
    assert_eq!(invocations(&broken, "/invoke").await, 1);
}

/// E2E test: retries happen against one agent before moving on
#[tokio::test]
async fn test_e2e_retries_before_fallback() {
    let broken = failing_acp_agent(503).await;
    let backup = acp_hello_agent().await;
    let options = TestOptions {
        max_retries: 2,
        ..TestOptions::default()
    };
    let server = TestServer::start_with(
        vec![
            endpoint(ProtocolType::Acp, "hello", &broken.uri()),
            endpoint(ProtocolType::Acp, "hello-backup", &backup.uri()),
        ],
        options,
    )
    .await;

    let body = server.route("Hello!").await;

    assert_eq!(body["success"], json!(true), "{body}");
    assert_eq!(invocations(&broken, "/invoke").await, 3);
    assert_eq!(invocations(&backup, "/invoke").await, 1);
}

/// E2E test: client errors are not retried
#[tokio::test]
async fn test_e2e_client_error_not_retried() {
    let broken = failing_acp_agent(400).await;
    let options = TestOptions {
        max_retries: 3,
        ..TestOptions::default()
    };
    let server = TestServer::start_with(vec![endpoint(ProtocolType::Acp, "hello", &broken.uri())], options).await;

    let body = server.route("Hello!").await;

    assert_eq!(body["success"], json!(false));
    assert_eq!(invocations(&broken, "/invoke").await, 1);
}

/// E2E test: every candidate failing is a structured failure, not an HTTP error
#[tokio::test]
async fn test_e2e_all_agents_failed() {
    let broken = failing_acp_agent(500).await;
    let server = TestServer::start(vec![endpoint(ProtocolType::Acp, "hello", &broken.uri())]).await;

    let body = server.route("Hello!").await;

    assert_eq!(body["success"], json!(false));
    assert_eq!(body["metadata"]["error_type"], json!("all_agents_failed"));
    assert_eq!(body["metadata"]["tried_agents"], json!(["acp-hello"]));
    assert!(body["error"].as_str().unwrap().contains("acp-hello"));
}

/// E2E test: an open breaker skips the agent without calling it
#[tokio::test]
async fn test_e2e_circuit_opens_after_failures() {
    let broken = failing_acp_agent(500).await;
    let backup = acp_hello_agent().await;
    let options = TestOptions {
        failure_threshold: 2,
        ..TestOptions::default()
    };
    let server = TestServer::start_with(
        vec![
            endpoint(ProtocolType::Acp, "hello", &broken.uri()),
            endpoint(ProtocolType::Acp, "hello-backup", &backup.uri()),
        ],
        options,
    )
    .await;

    for _ in 0..3 {
        let body = server.route("Hello!").await;
        assert_eq!(body["success"], json!(true), "{body}");
        assert_eq!(body["agent_id"], json!("acp-hello-backup"));
    }

    // Third request never reached the broken agent
    assert_eq!(invocations(&broken, "/invoke").await, 2);

    let status = TestServer::json_body(server.get("/status").await).await;
    let breaker = status["circuit_breakers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["agent_id"] == json!("acp-hello"))
        .cloned()
        .unwrap();
    assert_eq!(breaker["state"], json!("open"));
    assert_eq!(breaker["rejections"], json!(1));
}

/// E2E test: nothing registered yields a structured failure
#[tokio::test]
async fn test_e2e_no_agents() {
    let server = TestServer::start(Vec::new()).await;

    let body = server.route("What is 2+2?").await;

    assert_eq!(body["success"], json!(false));
    assert_eq!(body["metadata"]["error_type"], json!("no_healthy_agents"));
}

/// E2E test: concurrent requests are served independently
#[tokio::test]
async fn test_e2e_concurrent_requests() {
    let math = a2a_math_agent("4").await;
    let hello = acp_hello_agent().await;
    let server = TestServer::start(vec![
        endpoint(ProtocolType::A2a, "math", &math.uri()),
        endpoint(ProtocolType::Acp, "hello", &hello.uri()),
    ])
    .await;

    let queries = ["1+1", "Hello", "3*4", "Good morning", "10/2", "hey"];
    let responses = route_all(&server, &queries).await;

    for (query, body) in queries.iter().zip(responses) {
        assert_eq!(body["success"], json!(true), "{query}: {body}");
        let expected = if query.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            "a2a-math"
        } else {
            "acp-hello"
        };
        assert_eq!(body["agent_id"], json!(expected), "{query}");
    }

    let status = TestServer::json_body(server.get("/status").await).await;
    assert_eq!(status["routing"]["total_requests"], json!(queries.len()));
}

async fn route_all(server: &TestServer, queries: &[&str]) -> Vec<serde_json::Value> {
    let mut set = tokio::task::JoinSet::new();
    for (i, query) in queries.iter().enumerate() {
        let client = server.client.clone();
        let url = server.url("/route");
        let query = (*query).to_string();
        set.spawn(async move {
            let body: serde_json::Value = client
                .post(url)
                .json(&json!({"query": query}))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            (i, body)
        });
    }

    let mut results = vec![serde_json::Value::Null; queries.len()];
    while let Some(joined) = set.join_next().await {
        let (i, body) = joined.unwrap();
        results[i] = body;
    }
    results
}
