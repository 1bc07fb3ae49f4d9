//! Test helper utilities for integration tests

use once_cell::sync::Lazy;
use orchestrator_config::ServerConfig;
use orchestrator_core::{AgentEndpoint, ProtocolType};
use orchestrator_discovery::{AgentRegistry, DiscoveryConfig, DiscoveryScheduler, RegistryConfig, StrategySet};
use orchestrator_protocols::{default_clients, HttpConfig};
use orchestrator_resilience::{CircuitBreakerConfig, RetryPolicyBuilder};
use orchestrator_routing::{DecisionConfig, EngineConfig, KeywordOracle, LoadTracker, RoutingDecisionMaker, RoutingEngine};
use orchestrator_server::{AppState, Server};
use orchestrator_telemetry::OrchestratorMetrics;
use reqwest::{Client, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Endpoint pointing at a mock agent
pub fn endpoint(protocol: ProtocolType, name: &str, url: &str) -> AgentEndpoint {
    AgentEndpoint::new(protocol, url).with_name(name)
}

/// Knobs for the orchestrator under test
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// Retries per agent
    pub max_retries: u32,
    /// Consecutive failures before a breaker opens
    pub failure_threshold: u32,
    /// Fallback to alternatives
    pub enable_fallback: bool,
    /// Discovery interval; long by default so tests drive refreshes
    pub discovery_interval: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            failure_threshold: 5,
            enable_fallback: true,
            discovery_interval: Duration::from_secs(3600),
        }
    }
}

/// A running orchestrator with its HTTP surface
pub struct TestServer {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Base URL for the server
    pub base_url: String,
    /// Registry shared with the engine
    pub registry: Arc<AgentRegistry>,
    /// Discovery scheduler
    pub scheduler: DiscoveryScheduler,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Start an orchestrator discovering the given endpoints
    pub async fn start(endpoints: Vec<AgentEndpoint>) -> Self {
        Self::start_with(endpoints, TestOptions::default()).await
    }

    /// Start an orchestrator with custom options
    pub async fn start_with(endpoints: Vec<AgentEndpoint>, options: TestOptions) -> Self {
        init_tracing();

        let metrics = Arc::new(OrchestratorMetrics::new().expect("Failed to create metrics"));
        let clients = default_clients(HttpConfig::default().with_probe_timeout(Duration::from_secs(2)))
            .expect("Failed to create protocol clients");

        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
        let scheduler = DiscoveryScheduler::new(
            DiscoveryConfig::default()
                .with_interval(options.discovery_interval)
                .with_probe_timeout(Duration::from_secs(2))
                .with_endpoints(endpoints),
            Arc::clone(&registry),
            StrategySet::from_clients(&clients),
            Some(Arc::clone(&metrics)),
        );

        let decision_maker = RoutingDecisionMaker::new(
            Arc::new(KeywordOracle::new()),
            Arc::new(LoadTracker::new()),
            DecisionConfig::default(),
        )
        .with_metrics(Arc::clone(&metrics));
        let engine = RoutingEngine::new(Arc::clone(&registry), decision_maker, clients)
            .with_breaker_config(
                CircuitBreakerConfig::default()
                    .with_failure_threshold(options.failure_threshold)
                    .with_open_timeout(Duration::from_secs(60)),
            )
            .with_retry(
                RetryPolicyBuilder::new()
                    .max_retries(options.max_retries)
                    .base_delay(Duration::from_millis(5))
                    .max_jitter(Duration::ZERO)
                    .build(),
            )
            .with_config(
                EngineConfig::default()
                    .with_default_timeout(Duration::from_secs(10))
                    .with_fallback(options.enable_fallback),
            )
            .with_metrics(Arc::clone(&metrics));

        scheduler.start().await.expect("Failed to start discovery");

        let state = AppState::new(Arc::new(engine))
            .with_scheduler(scheduler.clone())
            .with_metrics(metrics);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let server = Server::new(ServerConfig::default(), state);
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            base_url: format!("http://{addr}"),
            registry,
            scheduler,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a POST request with a JSON body
    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Route a query and return the `AgentResponse` body
    pub async fn route(&self, query: &str) -> Value {
        let response = self.post_json("/route", &serde_json::json!({"query": query})).await;
        assert_status(&response, 200);
        Self::json_body(response).await
    }

    /// Parse response body as JSON
    pub async fn json_body(response: Response) -> Value {
        response.json().await.expect("Failed to parse JSON")
    }

    /// Shutdown the test server
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Assert that a response has the expected status code
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status().as_u16()
    );
}

/// Wait until `check` holds, polling every 20ms for up to five seconds
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
