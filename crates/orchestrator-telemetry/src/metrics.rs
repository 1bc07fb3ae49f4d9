//! Prometheus metrics.

use orchestrator_core::ProtocolType;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Metrics registration or encoding failure
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus rejected a metric
    #[error("metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// Exposition text was not UTF-8
    #[error("metrics encoding error: {0}")]
    Encoding(String),
}

/// Orchestrator metrics, owning their own registry
#[derive(Debug, Clone)]
pub struct OrchestratorMetrics {
    registry: Registry,
    route_requests: IntCounterVec,
    route_duration: Histogram,
    decision_duration: Histogram,
    agent_calls: IntCounterVec,
    fallbacks: IntCounter,
    circuit_rejections: IntCounterVec,
    discovery_cycles: IntCounter,
    registered_agents: IntGaugeVec,
}

impl OrchestratorMetrics {
    /// Create and register all metrics
    ///
    /// # Errors
    /// Returns error if a metric cannot be registered
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let route_requests = IntCounterVec::new(
            Opts::new("orchestrator_route_requests_total", "Routed requests by outcome"),
            &["outcome"],
        )?;
        let route_duration = Histogram::with_opts(
            HistogramOpts::new("orchestrator_route_duration_seconds", "End-to-end routing latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        let decision_duration = Histogram::with_opts(
            HistogramOpts::new("orchestrator_routing_decision_seconds", "Time spent choosing an agent")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )?;
        let agent_calls = IntCounterVec::new(
            Opts::new("orchestrator_agent_calls_total", "Agent executions by outcome"),
            &["agent_id", "protocol", "outcome"],
        )?;
        let fallbacks = IntCounter::with_opts(Opts::new(
            "orchestrator_fallbacks_total",
            "Requests served by an alternative agent",
        ))?;
        let circuit_rejections = IntCounterVec::new(
            Opts::new("orchestrator_circuit_rejections_total", "Calls rejected by an open breaker"),
            &["agent_id"],
        )?;
        let discovery_cycles = IntCounter::with_opts(Opts::new(
            "orchestrator_discovery_cycles_total",
            "Completed discovery cycles",
        ))?;
        let registered_agents = IntGaugeVec::new(
            Opts::new("orchestrator_registered_agents", "Registered agents by status"),
            &["status"],
        )?;

        registry.register(Box::new(route_requests.clone()))?;
        registry.register(Box::new(route_duration.clone()))?;
        registry.register(Box::new(decision_duration.clone()))?;
        registry.register(Box::new(agent_calls.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(circuit_rejections.clone()))?;
        registry.register(Box::new(discovery_cycles.clone()))?;
        registry.register(Box::new(registered_agents.clone()))?;

        Ok(Self {
            registry,
            route_requests,
            route_duration,
            decision_duration,
            agent_calls,
            fallbacks,
            circuit_rejections,
            discovery_cycles,
            registered_agents,
        })
    }

    /// Underlying registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a finished `route` call
    pub fn record_route(&self, success: bool, duration: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.route_requests.with_label_values(&[outcome]).inc();
        self.route_duration.observe(duration.as_secs_f64());
    }

    /// Record the time a routing decision took
    pub fn record_decision(&self, duration: Duration) {
        self.decision_duration.observe(duration.as_secs_f64());
    }

    /// Record one agent execution attempt chain
    pub fn record_agent_call(&self, agent_id: &str, protocol: ProtocolType, outcome: &str) {
        self.agent_calls
            .with_label_values(&[agent_id, protocol.as_str(), outcome])
            .inc();
    }

    /// Record a request served by a fallback agent
    pub fn record_fallback(&self) {
        self.fallbacks.inc();
    }

    /// Record a call short-circuited by an open breaker
    pub fn record_circuit_rejection(&self, agent_id: &str) {
        self.circuit_rejections.with_label_values(&[agent_id]).inc();
    }

    /// Record a completed discovery cycle
    pub fn record_discovery_cycle(&self) {
        self.discovery_cycles.inc();
    }

    /// Publish registry counts by status; statuses absent from `counts` drop out
    pub fn set_registered_agents(&self, counts: &BTreeMap<String, usize>) {
        self.registered_agents.reset();
        for (status, count) in counts {
            self.registered_agents
                .with_label_values(&[status.as_str()])
                .set(i64::try_from(*count).unwrap_or(i64::MAX));
        }
    }

    /// Render the text exposition format
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn gather(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}
