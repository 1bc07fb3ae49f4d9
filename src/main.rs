//! # Agent Orchestrator
//!
//! Discovers agents speaking ACP, A2A, MCP or plain HTTP, and routes each
//! query to the agent best able to answer it.
//!
//! ## Features
//!
//! - Periodic capability discovery with an atomically swapped registry
//! - Keyword or LLM-backed capability matching
//! - Per-agent circuit breakers, retry with backoff and a fallback chain
//! - Prometheus metrics and structured tracing
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! agent-orchestrator
//!
//! # Start with a config file
//! agent-orchestrator --config /path/to/orchestrator.yaml
//!
//! # Agents from the environment
//! ORCHESTRATOR_ENDPOINTS="a2a=http://math:8080,acp=http://hello:8000" agent-orchestrator
//! ```

use anyhow::Context;
use clap::Parser;
use orchestrator_config::{OracleProvider, OrchestratorConfig};
use orchestrator_discovery::{AgentRegistry, DiscoveryConfig, DiscoveryScheduler, RegistryConfig, StrategySet};
use orchestrator_protocols::{default_clients, HttpConfig};
use orchestrator_resilience::{CircuitBreakerConfig, RetryPolicyBuilder};
use orchestrator_routing::{
    CapabilityOracle, DecisionConfig, EngineConfig, KeywordOracle, LlmOracle, LlmOracleConfig, LlmProvider,
    LoadTracker, RoutingDecisionMaker, RoutingEngine,
};
use orchestrator_server::{shutdown_signal, AppState, Server};
use orchestrator_telemetry::{init_tracing, shutdown_tracing, OrchestratorMetrics, TracingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "agent-orchestrator", version, about)]
struct Cli {
    /// Configuration file (.yaml, .yml or .toml); falls back to ORCHESTRATOR_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(2);
        }
    };

    let tracing_config = TracingConfig::new(config.telemetry.service_name.clone())
        .with_log_level(config.telemetry.log_level.clone())
        .with_json_logs(config.telemetry.json_logs)
        .with_otel(config.telemetry.otel_enabled);
    let tracing_config = match &config.telemetry.otlp_endpoint {
        Some(endpoint) => tracing_config.with_otlp_endpoint(endpoint.clone()),
        None => tracing_config,
    };
    let provider = match init_tracing(&tracing_config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            None
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Starting agent orchestrator");

    let code = match run(config).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = ?e, "Orchestrator failed");
            1
        }
    };

    shutdown_tracing(provider);
    std::process::exit(code);
}

/// Load configuration and apply command line overrides
fn load_config(cli: &Cli) -> anyhow::Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::load_layers(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(level) = &cli.log_level {
        config = config.with_log_level(level.clone());
    }
    if cli.json_logs {
        config = config.with_json_logs(true);
    }
    config.validate()?;
    Ok(config)
}

/// Main application logic
async fn run(config: OrchestratorConfig) -> anyhow::Result<()> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        endpoints = config.discovery.endpoints.len(),
        oracle = config.oracle.provider.as_str(),
        "Configuration loaded"
    );

    let metrics = Arc::new(OrchestratorMetrics::new().context("failed to register metrics")?);

    // Protocol clients share one pooled transport
    let clients = default_clients(HttpConfig::default().with_probe_timeout(config.discovery.probe_timeout))
        .context("failed to build protocol clients")?;
    info!(protocols = ?clients.protocols(), "Protocol clients ready");

    // Registry and discovery
    let registry = Arc::new(AgentRegistry::new(
        RegistryConfig::default()
            .with_eviction_cycles(config.discovery.eviction_cycles)
            .with_eviction_window(config.discovery.eviction_window),
    ));
    let discovery_config = DiscoveryConfig::default()
        .with_interval(config.discovery.interval)
        .with_probe_timeout(config.discovery.probe_timeout)
        .with_max_concurrency(config.discovery.max_concurrency)
        .with_endpoints(config.discovery.endpoints.clone());
    let scheduler = DiscoveryScheduler::new(
        discovery_config,
        Arc::clone(&registry),
        StrategySet::from_clients(&clients),
        Some(Arc::clone(&metrics)),
    );

    // Decision making
    let load = Arc::new(LoadTracker::new());
    let decision_config = DecisionConfig::default()
        .with_min_confidence(config.routing.min_confidence)
        .with_max_alternatives(config.routing.max_alternatives);
    let mut decision_maker = RoutingDecisionMaker::new(build_oracle(&config)?, load, decision_config)
        .with_metrics(Arc::clone(&metrics));
    if config.oracle.provider.is_llm() && config.oracle.fallback_to_keyword {
        decision_maker = decision_maker.with_fallback(Arc::new(KeywordOracle::new()));
    }

    // Execution engine
    let resilience = &config.resilience;
    let retry = RetryPolicyBuilder::new()
        .max_retries(resilience.max_retries)
        .base_delay(resilience.base_delay)
        .max_delay(resilience.max_delay)
        .max_jitter(resilience.max_jitter)
        .build();
    let engine = RoutingEngine::new(Arc::clone(&registry), decision_maker, clients)
        .with_breaker_config(
            CircuitBreakerConfig::default()
                .with_failure_threshold(resilience.failure_threshold)
                .with_open_timeout(resilience.open_timeout),
        )
        .with_retry(retry)
        .with_config(
            EngineConfig::default()
                .with_default_timeout(config.routing.default_timeout)
                .with_fallback(config.routing.enable_fallback),
        )
        .with_metrics(Arc::clone(&metrics));

    // First discovery pass completes before the server accepts requests
    let report = scheduler.start().await.context("failed to start discovery")?;
    info!(
        discovered = report.discovered,
        fallbacks = report.fallbacks,
        duration_ms = report.duration_ms,
        "Initial discovery complete"
    );
    if registry.healthy().is_empty() {
        warn!("No healthy agents after initial discovery");
    }

    let state = AppState::new(Arc::new(engine))
        .with_scheduler(scheduler.clone())
        .with_metrics(metrics);

    let result = Server::new(config.server.clone(), state)
        .run(shutdown_signal())
        .await;

    scheduler.stop().await;
    result?;

    info!("Orchestrator shut down");
    Ok(())
}

/// Build the primary capability oracle
fn build_oracle(config: &OrchestratorConfig) -> anyhow::Result<Arc<dyn CapabilityOracle>> {
    let settings = &config.oracle;
    let provider = match settings.provider {
        OracleProvider::Keyword => return Ok(Arc::new(KeywordOracle::new())),
        OracleProvider::OpenAi => LlmProvider::OpenAi,
        OracleProvider::Anthropic => LlmProvider::Anthropic,
    };

    let api_key = settings
        .api_key
        .clone()
        .with_context(|| format!("{} oracle requires an API key", settings.provider.as_str()))?;

    let mut llm_config = LlmOracleConfig::new(provider, api_key, settings.model_name())
        .with_timeout(settings.timeout)
        .with_temperature(settings.temperature)
        .with_max_tokens(settings.max_tokens);
    if let Some(base_url) = &settings.base_url {
        llm_config = llm_config.with_base_url(base_url.clone());
    }

    let oracle = LlmOracle::new(llm_config).context("failed to build LLM oracle")?;
    info!(provider = %provider, model = settings.model_name(), "Using LLM capability oracle");
    Ok(Arc::new(oracle))
}
