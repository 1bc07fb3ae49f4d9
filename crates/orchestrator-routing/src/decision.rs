//! Routing decisions.
//!
//! Turns an oracle ranking into a [`RoutingDecision`]: drops candidates below
//! the confidence floor, orders the rest by confidence, then in-flight load,
//! then agent id, keeps one entry per agent, and promotes the caller's preferred agent when it qualifies.

use orchestrator_core::{Agent, RoutingDecision, RoutingRequest};
use orchestrator_telemetry::OrchestratorMetrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::load::LoadTracker;
use crate::oracle::{AgentProfile, CapabilityOracle, OracleRanking};

/// Decision settings
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Candidates scoring below this are discarded
    pub min_confidence: f64,
    /// Maximum number of fallback candidates kept
    pub max_alternatives: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            max_alternatives: 3,
        }
    }
}

impl DecisionConfig {
    /// Set the confidence floor
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the alternative count
    #[must_use]
    pub fn with_max_alternatives(mut self, max_alternatives: usize) -> Self {
        self.max_alternatives = max_alternatives;
        self
    }
}

/// Chooses an agent for a request
pub struct RoutingDecisionMaker {
    oracle: Arc<dyn CapabilityOracle>,
    fallback: Option<Arc<dyn CapabilityOracle>>,
    load: Arc<LoadTracker>,
    config: DecisionConfig,
    metrics: Option<Arc<OrchestratorMetrics>>,
}

impl RoutingDecisionMaker {
    /// Create a decision maker around an oracle
    pub fn new(oracle: Arc<dyn CapabilityOracle>, load: Arc<LoadTracker>, config: DecisionConfig) -> Self {
        Self {
            oracle,
            fallback: None,
            load,
            config,
            metrics: None,
        }
    }

    /// Oracle consulted when the primary one fails
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn CapabilityOracle>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Record decision latency
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Name of the primary oracle
    #[must_use]
    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Load tracker consulted for tie-breaks
    #[must_use]
    pub fn load(&self) -> &Arc<LoadTracker> {
        &self.load
    }

    /// Decide which of `agents` should serve `request`.
    ///
    /// `agents` is expected to hold healthy agents only. An empty slice
    /// yields a decision with no selection, without consulting the oracle.
    pub async fn decide(&self, request_id: &str, request: &RoutingRequest, agents: &[Agent]) -> RoutingDecision {
        let started = Instant::now();
        let decision = self.decide_inner(request_id, request, agents).await;
        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(elapsed);
        }
        decision.with_timing(elapsed)
    }

    async fn decide_inner(&self, request_id: &str, request: &RoutingRequest, agents: &[Agent]) -> RoutingDecision {
        if agents.is_empty() {
            return RoutingDecision::none(request_id, "no healthy agents available");
        }

        let pool: Vec<&Agent> = match request.preferred_protocol {
            Some(protocol) if agents.iter().any(|a| a.protocol == protocol) => {
                agents.iter().filter(|a| a.protocol == protocol).collect()
            }
            Some(protocol) => {
                debug!(protocol = %protocol, "No healthy agent speaks the preferred protocol, ignoring preference");
                agents.iter().collect()
            }
            None => agents.iter().collect(),
        };
        let profiles: Vec<AgentProfile> = pool.iter().map(|a| AgentProfile::from_agent(a)).collect();

        let (ranking, oracle_name) = match self.rank(request, &profiles).await {
            Ok(ranked) => ranked,
            Err(message) => {
                return RoutingDecision::none(request_id, message).with_oracle(self.oracle.name());
            }
        };

        let by_id: HashMap<&str, &Agent> = pool.iter().map(|a| (a.agent_id.as_str(), *a)).collect();
        let mut ranked: Vec<(&Agent, f64, usize)> = ranking
            .candidates
            .iter()
            .filter(|c| c.confidence >= self.config.min_confidence)
            .filter_map(|c| {
                by_id
                    .get(c.agent_id.as_str())
                    .map(|agent| (*agent, c.confidence, self.load.in_flight(&agent.agent_id)))
            })
            .collect();

        ranked.sort_by(|(a, conf_a, load_a), (b, conf_b, load_b)| {
            conf_b
                .total_cmp(conf_a)
                .then_with(|| load_a.cmp(load_b))
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        // Oracles may name an agent twice; keep its best score only
        let mut seen = HashSet::new();
        ranked.retain(|(agent, _, _)| seen.insert(agent.agent_id.clone()));

        let mut reasoning = ranking.reasoning;
        if let Some(preferred) = request.preferred_agent.as_deref() {
            if let Some(pos) = ranked.iter().position(|(a, _, _)| a.agent_id == preferred) {
                if pos > 0 {
                    let entry = ranked.remove(pos);
                    ranked.insert(0, entry);
                    reasoning = format!("{reasoning} (preferred agent {preferred} promoted)");
                }
            } else {
                debug!(agent_id = %preferred, "Preferred agent is not a viable candidate");
            }
        }

        let Some(&(selected, confidence, _)) = ranked.first() else {
            info!(
                request_id = %request_id,
                oracle = %oracle_name,
                min_confidence = self.config.min_confidence,
                "No agent scored above the confidence floor"
            );
            let reason = if reasoning.trim().is_empty() {
                format!("no agent scored above {:.2}", self.config.min_confidence)
            } else {
                format!("no agent scored above {:.2}: {reasoning}", self.config.min_confidence)
            };
            return RoutingDecision::none(request_id, reason).with_oracle(oracle_name);
        };

        let alternatives: Vec<Agent> = ranked
            .iter()
            .skip(1)
            .take(self.config.max_alternatives)
            .map(|(a, _, _)| (*a).clone())
            .collect();

        info!(
            request_id = %request_id,
            agent_id = %selected.agent_id,
            confidence = confidence,
            alternatives = alternatives.len(),
            oracle = %oracle_name,
            "Routing decision made"
        );

        RoutingDecision::selected(request_id, selected.clone(), confidence, reasoning, alternatives)
            .with_oracle(oracle_name)
    }

    /// Rank with the primary oracle, then the fallback; the error is a reason string
    async fn rank(
        &self,
        request: &RoutingRequest,
        profiles: &[AgentProfile],
    ) -> Result<(OracleRanking, String), String> {
        let context = request.context.as_ref();
        match self.oracle.rank(&request.query, context, profiles).await {
            Ok(ranking) => Ok((ranking, self.oracle.name().to_string())),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else {
                    warn!(oracle = %self.oracle.name(), error = %primary_err, "Oracle failed");
                    return Err(primary_err.to_string());
                };
                warn!(
                    oracle = %self.oracle.name(),
                    fallback = %fallback.name(),
                    error = %primary_err,
                    "Oracle failed, using fallback oracle"
                );
                fallback
                    .rank(&request.query, context, profiles)
                    .await
                    .map(|ranking| (ranking, fallback.name().to_string()))
                    .map_err(|e| format!("{primary_err}; fallback oracle: {e}"))
            }
        }
    }
}

impl std::fmt::Debug for RoutingDecisionMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingDecisionMaker")
            .field("oracle", &self.oracle.name())
            .field("fallback", &self.fallback.as_ref().map(|o| o.name().to_string()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
