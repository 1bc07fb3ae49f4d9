//! Routing engine.
//!
//! `route` snapshots the healthy agents, asks the decision maker for a
//! ranked choice, then walks the candidates in order. Each candidate is
//! called through its own circuit breaker inside the retry policy; an open
//! breaker or exhausted retries move on to the next candidate. Only when
//! every candidate has failed does the caller see an error.
//!
//! The request deadline bounds the decision and every attempt. Each
//! remaining candidate gets an equal share of what is left when its turn
//! comes, so a slow primary cannot starve the fallbacks.

use orchestrator_core::{
    new_request_id, Agent, AgentResponse, ClientRegistry, OrchestratorError, OrchestratorResult,
    RoutingDecision, RoutingRequest,
};
use orchestrator_discovery::AgentRegistry;
use orchestrator_resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats, RetryPolicy, RetryResult,
};
use orchestrator_telemetry::OrchestratorMetrics;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::decision::RoutingDecisionMaker;
use crate::load::LoadTracker;

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for requests that do not set `timeout_seconds`
    pub default_timeout: Duration,
    /// Try alternative agents when the selected one fails
    pub enable_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            enable_fallback: true,
        }
    }
}

impl EngineConfig {
    /// Set the default deadline
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Enable or disable the fallback chain
    #[must_use]
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.enable_fallback = enabled;
        self
    }
}

/// Request counters since startup
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// Requests routed
    pub total_requests: u64,
    /// Requests an agent answered
    pub successful_requests: u64,
    /// Requests that failed
    pub failed_requests: u64,
    /// Mean time per request
    pub avg_response_time_ms: f64,
    /// Successful share of all requests, 0.0 to 1.0
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
}

/// Result of running one candidate
struct AgentOutcome {
    result: OrchestratorResult<Value>,
    attempts: u32,
}

/// Routes requests to agents
pub struct RoutingEngine {
    registry: Arc<AgentRegistry>,
    decision_maker: RoutingDecisionMaker,
    clients: ClientRegistry,
    breakers: CircuitBreakerRegistry,
    retry: RetryPolicy,
    config: EngineConfig,
    metrics: Option<Arc<OrchestratorMetrics>>,
    counters: Counters,
    pruned_generation: AtomicU64,
}

impl RoutingEngine {
    /// Create an engine with default breaker, retry and engine settings
    pub fn new(registry: Arc<AgentRegistry>, decision_maker: RoutingDecisionMaker, clients: ClientRegistry) -> Self {
        Self {
            registry,
            decision_maker,
            clients,
            breakers: CircuitBreakerRegistry::default(),
            retry: RetryPolicy::with_defaults(),
            config: EngineConfig::default(),
            metrics: None,
            counters: Counters::default(),
            pruned_generation: AtomicU64::new(0),
        }
    }

    /// Use `config` for every agent's breaker
    #[must_use]
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breakers = CircuitBreakerRegistry::new(config);
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set engine settings
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Record routing metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry routed against
    #[must_use]
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Deadline applied when a request sets none
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }

    /// Protocol clients
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// In-flight load per agent
    #[must_use]
    pub fn load(&self) -> &Arc<LoadTracker> {
        self.decision_maker.load()
    }

    /// Name of the primary oracle
    #[must_use]
    pub fn oracle_name(&self) -> &str {
        self.decision_maker.oracle_name()
    }

    /// Route a request and execute it, falling back through alternatives.
    ///
    /// Never returns an error: failures are reported in the response.
    #[instrument(skip(self, request), fields(request_id = tracing::field::Empty))]
    pub async fn route(&self, request: &RoutingRequest) -> AgentResponse {
        let request_id = new_request_id();
        tracing::Span::current().record("request_id", request_id.as_str());
        let started = Instant::now();

        self.prune_departed_agents();
        let response = self.route_inner(&request_id, request, started).await;
        let elapsed = started.elapsed();
        self.record(response.success, elapsed);

        if response.success {
            info!(
                agent_id = response.agent_id.as_deref().unwrap_or_default(),
                duration_ms = elapsed.as_millis() as u64,
                "Request routed"
            );
        } else {
            warn!(
                error = response.error.as_deref().unwrap_or_default(),
                duration_ms = elapsed.as_millis() as u64,
                "Request failed"
            );
        }
        response
    }

    /// Decide without executing
    ///
    /// # Errors
    /// Returns error if the request is invalid or the decision overruns the deadline
    pub async fn decide(&self, request: &RoutingRequest) -> OrchestratorResult<RoutingDecision> {
        request.validate()?;
        let budget = request.timeout().unwrap_or(self.config.default_timeout);
        let request_id = new_request_id();
        let healthy = self.registry.healthy();
        tokio::time::timeout(budget, self.decision_maker.decide(&request_id, request, &healthy))
            .await
            .map_err(|_| OrchestratorError::deadline_exceeded(budget))
    }

    async fn route_inner(&self, request_id: &str, request: &RoutingRequest, started: Instant) -> AgentResponse {
        if let Err(e) = request.validate() {
            return AgentResponse::failure(request_id, None, &e, started.elapsed());
        }
        let budget = request.timeout().unwrap_or(self.config.default_timeout);
        let deadline = started + budget;

        let healthy = self.registry.healthy();
        if healthy.is_empty() {
            return AgentResponse::failure(
                request_id,
                None,
                &OrchestratorError::NoHealthyAgents,
                started.elapsed(),
            );
        }

        let decision = match tokio::time::timeout_at(
            deadline,
            self.decision_maker.decide(request_id, request, &healthy),
        )
        .await
        {
            Ok(decision) => decision,
            Err(_) => {
                let err = OrchestratorError::deadline_exceeded(budget);
                return AgentResponse::failure(request_id, None, &err, started.elapsed());
            }
        };

        if decision.selected_agent.is_none() {
            let reason = decision
                .error
                .clone()
                .unwrap_or_else(|| decision.reasoning.clone());
            let err = OrchestratorError::no_suitable_agent(reason);
            return AgentResponse::failure(request_id, None, &err, started.elapsed())
                .with_metadata("oracle", decision.oracle.clone());
        }

        self.execute_chain(request_id, request, &decision, deadline, budget, started)
            .await
    }

    async fn execute_chain(
        &self,
        request_id: &str,
        request: &RoutingRequest,
        decision: &RoutingDecision,
        deadline: Instant,
        budget: Duration,
        started: Instant,
    ) -> AgentResponse {
        let candidates: Vec<&Agent> = if self.config.enable_fallback {
            decision.candidates().collect()
        } else {
            decision.selected_agent.iter().collect()
        };

        let mut tried: Vec<String> = Vec::with_capacity(candidates.len());
        let mut total_attempts = 0u32;
        let mut last_error: Option<OrchestratorError> = None;
        let mut last_agent: Option<&Agent> = None;

        for (index, agent) in candidates.iter().enumerate() {
            let now = Instant::now();
            if now >= deadline {
                last_error = Some(OrchestratorError::deadline_exceeded(budget));
                break;
            }
            let share = (deadline - now) / u32::try_from(candidates.len() - index).unwrap_or(u32::MAX);
            let agent_deadline = now + share;

            if index > 0 {
                debug!(agent_id = %agent.agent_id, "Falling back to alternative agent");
            }
            tried.push(agent.agent_id.clone());
            last_agent = Some(agent);

            let outcome = self.execute_agent(agent, request, agent_deadline).await;
            total_attempts += outcome.attempts;

            match outcome.result {
                Ok(data) => {
                    if index > 0 {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_fallback();
                        }
                    }
                    return AgentResponse::success(request_id, agent, data, started.elapsed())
                        .with_metadata("attempts", total_attempts)
                        .with_metadata("fallback_used", index > 0)
                        .with_metadata("confidence", decision.confidence)
                        .with_metadata("reasoning", decision.reasoning.clone())
                        .with_metadata("tried_agents", tried)
                        .with_metadata("oracle", decision.oracle.clone())
                        .with_metadata("decision_time_ms", decision.decision_time_ms);
                }
                Err(err) => {
                    warn!(
                        agent_id = %agent.agent_id,
                        protocol = %agent.protocol,
                        attempts = outcome.attempts,
                        error = %err,
                        "Agent failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        let err = if tried.is_empty() {
            last_error.unwrap_or_else(|| OrchestratorError::deadline_exceeded(budget))
        } else {
            let last = last_error.map_or_else(|| "no attempt completed".to_string(), |e| e.to_string());
            OrchestratorError::all_agents_failed(tried.clone(), last)
        };
        AgentResponse::failure(request_id, last_agent, &err, started.elapsed())
            .with_metadata("attempts", total_attempts)
            .with_metadata("tried_agents", tried)
            .with_metadata("reasoning", decision.reasoning.clone())
    }

    /// Run one agent through its breaker and the retry policy
    async fn execute_agent(&self, agent: &Agent, request: &RoutingRequest, deadline: Instant) -> AgentOutcome {
        let client = match self.clients.get(agent.protocol) {
            Ok(client) => client,
            Err(err) => {
                return AgentOutcome {
                    result: Err(err),
                    attempts: 0,
                }
            }
        };
        let breaker = self.breakers.get_or_create(agent.protocol, &agent.agent_id);
        let _load = self.load().acquire(&agent.agent_id);

        let client = &client;
        let breaker = &breaker;
        let query = request.query.as_str();
        let context = request.context.as_ref();

        let result = self
            .retry
            .run(Some(deadline), |attempt| async move {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(OrchestratorError::timeout(Duration::ZERO));
                }
                debug!(agent_id = %agent.agent_id, attempt = attempt, timeout_ms = remaining.as_millis() as u64, "Calling agent");
                breaker
                    .call(|| async move {
                        tokio::time::timeout(remaining, client.execute(agent, query, context, remaining))
                            .await
                            .unwrap_or_else(|_| Err(OrchestratorError::timeout(remaining)))
                    })
                    .await
            })
            .await;

        let attempts = result.attempts();
        let (result, outcome) = match result {
            RetryResult::Success { value, .. } => (Ok(value), "success"),
            RetryResult::NonRetryable { error, .. } if matches!(error, OrchestratorError::CircuitOpen { .. }) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_circuit_rejection(&agent.agent_id);
                }
                (Err(error), "circuit_open")
            }
            RetryResult::NonRetryable { error, .. } => (Err(error), "failure"),
            RetryResult::Exhausted { error, attempts } => (
                Err(OrchestratorError::retry_exhausted(&agent.agent_id, attempts, error)),
                "failure",
            ),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_agent_call(&agent.agent_id, agent.protocol, outcome);
        }
        AgentOutcome { result, attempts }
    }

    /// Drop breakers and load entries of agents that left the registry
    fn prune_departed_agents(&self) {
        let snapshot = self.registry.snapshot();
        let generation = snapshot.generation();
        if self.pruned_generation.swap(generation, Ordering::AcqRel) == generation {
            return;
        }
        let known: HashSet<&str> = snapshot.iter().map(|a| a.agent_id.as_str()).collect();
        self.breakers.retain(|(_, agent_id)| known.contains(agent_id.as_str()));
        self.load().retain(|agent_id| known.contains(agent_id));
    }

    fn record(&self, success: bool, elapsed: Duration) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.counters.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .total_duration_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_route(success, elapsed);
        }
    }

    /// Request counters since startup
    pub fn stats(&self) -> EngineStats {
        let total = self.counters.total.load(Ordering::Relaxed);
        let successful = self.counters.successful.load(Ordering::Relaxed);
        let failed = self.counters.failed.load(Ordering::Relaxed);
        let duration = self.counters.total_duration_ms.load(Ordering::Relaxed);
        let (avg_response_time_ms, success_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (duration as f64 / total as f64, successful as f64 / total as f64)
        };
        EngineStats {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            avg_response_time_ms,
            success_rate,
        }
    }

    /// Stats of every breaker created so far
    pub fn breaker_stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers.stats()
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("decision_maker", &self.decision_maker)
            .field("clients", &self.clients)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionConfig;
    use crate::keyword::KeywordOracle;
    use crate::oracle::{AgentProfile, CapabilityOracle, OracleRanking, RankedCandidate};
    use async_trait::async_trait;
    use orchestrator_core::{AgentDescriptor, AgentStatus, Capability, ProtocolClient, ProtocolType};
    use orchestrator_resilience::RetryPolicyBuilder;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Copy)]
    enum Behavior {
        Answer,
        /// Fail with this HTTP status on every call
        Fail(u16),
        /// Fail with 503 for the first n calls, then answer
        FlakyFor(usize),
        Hang,
    }

    struct ScriptedClient {
        protocol: ProtocolType,
        behaviors: HashMap<String, Behavior>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedClient {
        fn new(protocol: ProtocolType, behaviors: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                protocol,
                behaviors: behaviors.iter().map(|(id, b)| ((*id).to_string(), *b)).collect(),
                calls: Mutex::new(HashMap::new()),
            })
        }

        fn calls(&self, agent_id: &str) -> usize {
            self.calls.lock().get(agent_id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl ProtocolClient for ScriptedClient {
        fn protocol(&self) -> ProtocolType {
            self.protocol
        }

        async fn probe(&self, _endpoint: &str) -> OrchestratorResult<AgentDescriptor> {
            Ok(AgentDescriptor::default())
        }

        async fn health_check(&self, _agent: &Agent) -> AgentStatus {
            AgentStatus::Healthy
        }

        async fn execute(
            &self,
            agent: &Agent,
            query: &str,
            _context: Option<&Value>,
            _timeout: Duration,
        ) -> OrchestratorResult<Value> {
            let call = {
                let mut calls = self.calls.lock();
                let count = calls.entry(agent.agent_id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            match self.behaviors.get(&agent.agent_id).copied().unwrap_or(Behavior::Answer) {
                Behavior::Answer => Ok(json!({"agent": agent.agent_id, "query": query})),
                Behavior::Fail(status) => Err(OrchestratorError::agent_http(&agent.agent_id, status, "boom")),
                Behavior::FlakyFor(n) if call <= n => {
                    Err(OrchestratorError::agent_http(&agent.agent_id, 503, "warming up"))
                }
                Behavior::FlakyFor(_) => Ok(json!({"agent": agent.agent_id})),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Value::Null)
                }
            }
        }
    }

    /// Ranks agents in the given order and counts invocations
    struct OrderedOracle {
        order: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CapabilityOracle for OrderedOracle {
        fn name(&self) -> &str {
            "ordered"
        }

        async fn rank(&self, _q: &str, _c: Option<&Value>, _a: &[AgentProfile]) -> OrchestratorResult<OracleRanking> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OracleRanking {
                candidates: self
                    .order
                    .iter()
                    .enumerate()
                    .map(|(i, id)| RankedCandidate::new(*id, 0.9 - 0.1 * i as f64))
                    .collect(),
                reasoning: "ordered".into(),
            })
        }
    }

    fn healthy(name: &str, capability: &str) -> Agent {
        Agent::new(ProtocolType::A2a, name, format!("http://{name}"))
            .with_status(AgentStatus::Healthy)
            .with_capability(Capability::new(capability, "").unwrap())
    }

    fn registry_with(agents: Vec<Agent>) -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::default());
        registry.replace(agents);
        registry
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicyBuilder::new()
            .max_retries(max_retries)
            .base_delay(Duration::from_millis(1))
            .max_jitter(Duration::ZERO)
            .build()
    }

    fn engine(
        registry: Arc<AgentRegistry>,
        oracle: Arc<dyn CapabilityOracle>,
        client: Arc<ScriptedClient>,
    ) -> RoutingEngine {
        let maker = RoutingDecisionMaker::new(oracle, Arc::new(LoadTracker::new()), DecisionConfig::default());
        RoutingEngine::new(registry, maker, ClientRegistry::new().with_client(client)).with_retry(fast_retry(0))
    }

    fn ordered(order: Vec<&'static str>) -> Arc<OrderedOracle> {
        Arc::new(OrderedOracle {
            order,
            calls: AtomicUsize::new(0),
        })
    }

    fn three_agents() -> Arc<AgentRegistry> {
        registry_with(vec![healthy("one", "x"), healthy("two", "x"), healthy("three", "x")])
    }

    #[tokio::test]
    async fn test_fallback_reaches_second_alternative() {
        let client = ScriptedClient::new(
            ProtocolType::A2a,
            &[("a2a-one", Behavior::Fail(500)), ("a2a-two", Behavior::Fail(500))],
        );
        let engine = engine(three_agents(), ordered(vec!["a2a-one", "a2a-two", "a2a-three"]), client.clone());

        let response = engine.route(&RoutingRequest::new("do x")).await;
        assert!(response.success, "{:?}", response.error);
        assert_eq!(response.agent_id.as_deref(), Some("a2a-three"));
        assert_eq!(response.metadata["fallback_used"], json!(true));
        assert_eq!(response.metadata["tried_agents"], json!(["a2a-one", "a2a-two", "a2a-three"]));
        assert_eq!(client.calls("a2a-one"), 1);
        assert_eq!(client.calls("a2a-two"), 1);
        assert_eq!(client.calls("a2a-three"), 1);
    }

    #[tokio::test]
    async fn test_all_agents_failed() {
        let client = ScriptedClient::new(
            ProtocolType::A2a,
            &[
                ("a2a-one", Behavior::Fail(500)),
                ("a2a-two", Behavior::Fail(500)),
                ("a2a-three", Behavior::Fail(400)),
            ],
        );
        let engine = engine(three_agents(), ordered(vec!["a2a-one", "a2a-two", "a2a-three"]), client.clone());

        let response = engine.route(&RoutingRequest::new("do x")).await;
        assert!(!response.success);
        assert_eq!(response.metadata["error_type"], json!("all_agents_failed"));
        assert!(response.error.unwrap().contains("a2a-one, a2a-two, a2a-three"));
        assert_eq!(client.calls("a2a-three"), 1);
        assert_eq!(engine.stats().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_empty_registry_skips_oracle() {
        let oracle = ordered(vec!["a2a-one"]);
        let client = ScriptedClient::new(ProtocolType::A2a, &[]);
        let engine = engine(registry_with(Vec::new()), oracle.clone(), client);

        let response = engine.route(&RoutingRequest::new("What is 2+2?")).await;
        assert!(!response.success);
        assert_eq!(response.metadata["error_type"], json!("no_healthy_agents"));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_agent() {
        let client = ScriptedClient::new(ProtocolType::A2a, &[("a2a-one", Behavior::Fail(500))]);
        let engine = engine(three_agents(), ordered(vec!["a2a-one", "a2a-two"]), client.clone())
            .with_breaker_config(
                CircuitBreakerConfig::default()
                    .with_failure_threshold(1)
                    .with_open_timeout(Duration::from_secs(60)),
            );

        let first = engine.route(&RoutingRequest::new("do x")).await;
        assert_eq!(first.agent_id.as_deref(), Some("a2a-two"));

        let second = engine.route(&RoutingRequest::new("do x")).await;
        assert!(second.success);
        assert_eq!(second.agent_id.as_deref(), Some("a2a-two"));
        // The open breaker rejected the second call before it reached the client
        assert_eq!(client.calls("a2a-one"), 1);

        let stats = engine.breaker_stats();
        let one = stats.iter().find(|s| s.agent_id == "a2a-one").unwrap();
        assert_eq!(one.rejections, 1);
    }

    #[tokio::test]
    async fn test_retries_before_fallback() {
        let client = ScriptedClient::new(ProtocolType::A2a, &[("a2a-one", Behavior::FlakyFor(2))]);
        let engine = engine(three_agents(), ordered(vec!["a2a-one", "a2a-two"]), client.clone())
            .with_retry(fast_retry(3));

        let response = engine.route(&RoutingRequest::new("do x")).await;
        assert_eq!(response.agent_id.as_deref(), Some("a2a-one"));
        assert_eq!(response.metadata["attempts"], json!(3));
        assert_eq!(response.metadata["fallback_used"], json!(false));
        assert_eq!(client.calls("a2a-two"), 0);
    }

    #[tokio::test]
    async fn test_deadline_bounds_request() {
        let client = ScriptedClient::new(
            ProtocolType::A2a,
            &[("a2a-one", Behavior::Hang), ("a2a-two", Behavior::Hang)],
        );
        let engine = engine(three_agents(), ordered(vec!["a2a-one", "a2a-two"]), client);

        let started = std::time::Instant::now();
        let response = engine
            .route(&RoutingRequest::new("do x").with_timeout(Duration::from_millis(200)))
            .await;
        assert!(!response.success);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fallback_disabled_tries_only_selected() {
        let client = ScriptedClient::new(ProtocolType::A2a, &[("a2a-one", Behavior::Fail(500))]);
        let engine = engine(three_agents(), ordered(vec!["a2a-one", "a2a-two"]), client.clone())
            .with_config(EngineConfig::default().with_fallback(false));

        let response = engine.route(&RoutingRequest::new("do x")).await;
        assert!(!response.success);
        assert_eq!(client.calls("a2a-two"), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_math_query() {
        let registry = registry_with(vec![
            healthy("math", "arithmetic"),
            Agent::new(ProtocolType::Acp, "hello", "http://hello")
                .with_status(AgentStatus::Healthy)
                .with_capability(Capability::new("greeting", "").unwrap()),
        ]);
        let client = ScriptedClient::new(ProtocolType::A2a, &[]);
        let engine = engine(registry, Arc::new(KeywordOracle::new()), client);

        let decision = engine.decide(&RoutingRequest::new("What is 2+2?")).await.unwrap();
        assert_eq!(decision.selected_agent.unwrap().agent_id, "a2a-math");
        assert!(decision.confidence > 0.8);

        let response = engine.route(&RoutingRequest::new("What is 2+2?")).await;
        assert!(response.success);
        assert_eq!(response.agent_id.as_deref(), Some("a2a-math"));

        let stats = engine.stats();
        assert_eq!(stats.total_requests, 1);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_request_is_failure_response() {
        let client = ScriptedClient::new(ProtocolType::A2a, &[]);
        let engine = engine(three_agents(), ordered(vec!["a2a-one"]), client);
        let response = engine.route(&RoutingRequest::new("  ")).await;
        assert!(!response.success);
        assert_eq!(response.metadata["error_type"], json!("invalid_request"));
        assert!(engine.decide(&RoutingRequest::new("")).await.is_err());
    }
}
