//! Background discovery loop.
//!
//! `Idle → Running → (sleep interval | refresh requested) → Running → …`
//! until [`DiscoveryScheduler::stop`] is called. Every cycle probes all
//! configured endpoints with bounded parallelism and publishes the results
//! to the registry in one atomic replace.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use orchestrator_core::{Agent, AgentEndpoint, OrchestratorError, OrchestratorResult};
use orchestrator_telemetry::OrchestratorMetrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::registry::{AgentRegistry, ReplaceOutcome};
use crate::strategy::{fallback_agent, StrategySet};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Time between refresh cycles
    pub interval: Duration,
    /// Timeout of a single probe request
    pub probe_timeout: Duration,
    /// Maximum endpoints probed at once
    pub max_concurrency: usize,
    /// Endpoints to discover
    pub endpoints: Vec<AgentEndpoint>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            max_concurrency: 8,
            endpoints: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Set the refresh interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the probe timeout
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the parallelism bound
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set the endpoint list
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<AgentEndpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Upper bound for discovering one endpoint: the probe plus the health
    /// check each issue a few sequential requests bounded by `probe_timeout`
    fn endpoint_budget(&self) -> Duration {
        self.probe_timeout.saturating_mul(3)
    }
}

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Not started yet
    Idle,
    /// Refresh loop active
    Running,
    /// Stopped; cannot be restarted
    Stopped,
}

/// Result of one refresh cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Endpoints probed
    pub endpoints: usize,
    /// Agents discovered natively
    pub discovered: usize,
    /// Agents built from static hints after a failed probe
    pub fallbacks: usize,
    /// What the registry did with the results
    pub registry: ReplaceOutcome,
    /// Cycle wall time
    pub duration_ms: u64,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

struct Inner {
    config: DiscoveryConfig,
    registry: Arc<AgentRegistry>,
    strategies: StrategySet,
    metrics: Option<Arc<OrchestratorMetrics>>,
    state: Mutex<SchedulerState>,
    refresh: Notify,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    cycle_lock: tokio::sync::Mutex<()>,
    cycles: AtomicU64,
    last_report: Mutex<Option<CycleReport>>,
}

/// Periodic discovery driver. Cloning yields another handle to the same loop.
#[derive(Clone)]
pub struct DiscoveryScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DiscoveryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryScheduler")
            .field("state", &self.state())
            .field("endpoints", &self.inner.config.endpoints.len())
            .field("cycles", &self.cycles())
            .finish_non_exhaustive()
    }
}

impl DiscoveryScheduler {
    /// Create a scheduler in the `Idle` state
    #[must_use]
    pub fn new(
        config: DiscoveryConfig,
        registry: Arc<AgentRegistry>,
        strategies: StrategySet,
        metrics: Option<Arc<OrchestratorMetrics>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                strategies,
                metrics,
                state: Mutex::new(SchedulerState::Idle),
                refresh: Notify::new(),
                shutdown,
                handle: Mutex::new(None),
                cycle_lock: tokio::sync::Mutex::new(()),
                cycles: AtomicU64::new(0),
                last_report: Mutex::new(None),
            }),
        }
    }

    /// Run the first cycle to completion, then start the background loop.
    ///
    /// The registry is populated when this returns.
    ///
    /// # Errors
    /// Returns error if the scheduler was already started or stopped
    pub async fn start(&self) -> OrchestratorResult<CycleReport> {
        {
            let mut state = self.inner.state.lock();
            if *state != SchedulerState::Idle {
                return Err(OrchestratorError::configuration(format!(
                    "discovery scheduler cannot start from state {:?}",
                    *state
                )));
            }
            *state = SchedulerState::Running;
        }

        info!(
            endpoints = self.inner.config.endpoints.len(),
            interval = ?self.inner.config.interval,
            "Starting discovery scheduler"
        );
        let report = self.inner.run_cycle().await;

        if self.state() == SchedulerState::Running {
            let inner = Arc::clone(&self.inner);
            let shutdown = inner.shutdown.subscribe();
            let handle = tokio::spawn(async move { inner.run_loop(shutdown).await });
            *self.inner.handle.lock() = Some(handle);
        }
        Ok(report)
    }

    /// Run one cycle now, outside the loop
    pub async fn run_cycle(&self) -> CycleReport {
        self.inner.run_cycle().await
    }

    /// Request an out-of-cycle refresh; returns `false` once stopped.
    ///
    /// A running loop picks the request up immediately. Before `start` the
    /// cycle is spawned on its own.
    pub fn trigger_refresh(&self) -> bool {
        match self.state() {
            SchedulerState::Running => {
                self.inner.refresh.notify_one();
                true
            }
            SchedulerState::Idle => {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    inner.run_cycle().await;
                });
                true
            }
            SchedulerState::Stopped => false,
        }
    }

    /// Stop the loop and wait for it to exit. An in-flight cycle is abandoned
    /// before it publishes.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == SchedulerState::Stopped {
                return;
            }
            *state = SchedulerState::Stopped;
        }
        self.inner.shutdown.send_replace(true);

        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Discovery loop ended abnormally");
            }
        }
        info!(cycles = self.cycles(), "Discovery scheduler stopped");
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.inner.state.lock()
    }

    /// Completed cycles
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    /// Report of the most recent cycle
    #[must_use]
    pub fn last_report(&self) -> Option<CycleReport> {
        self.inner.last_report.lock().clone()
    }

    /// Registry this scheduler publishes to
    #[must_use]
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.inner.registry
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }
}

impl Inner {
    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                () = self.refresh.notified() => debug!("Out-of-cycle refresh requested"),
                () = tokio::time::sleep(self.config.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = self.run_cycle() => {}
            }
        }
        debug!("Discovery loop exited");
    }

    #[instrument(skip(self), fields(endpoints = self.config.endpoints.len()))]
    async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();

        let lookups: Vec<_> = self
            .config
            .endpoints
            .iter()
            .map(|endpoint| self.discover_one(endpoint))
            .collect();
        let results: Vec<(Agent, bool)> = stream::iter(lookups)
            // Ordered, so duplicate ids resolve by endpoint order
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let fallbacks = results.iter().filter(|(_, native)| !native).count();
        let discovered = results.len() - fallbacks;
        let outcome = self
            .registry
            .replace(results.into_iter().map(|(agent, _)| agent).collect());

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_discovery_cycle();
            metrics.set_registered_agents(&self.registry.stats().by_status);
        }

        let report = CycleReport {
            endpoints: self.config.endpoints.len(),
            discovered,
            fallbacks,
            registry: outcome,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            completed_at: Utc::now(),
        };
        info!(
            cycle,
            generation = report.registry.generation,
            discovered,
            fallbacks,
            evicted = report.registry.evicted.len(),
            duration_ms = report.duration_ms,
            "Discovery cycle complete"
        );
        *self.last_report.lock() = Some(report.clone());
        report
    }

    /// Discover one endpoint; the flag is `false` when the fallback was used
    async fn discover_one(&self, endpoint: &AgentEndpoint) -> (Agent, bool) {
        let Some(strategy) = self.strategies.get(endpoint.protocol) else {
            warn!(endpoint = %endpoint.url, protocol = %endpoint.protocol, "No discovery strategy for protocol");
            return (
                fallback_agent(endpoint.protocol, endpoint, "no discovery strategy"),
                false,
            );
        };

        match tokio::time::timeout(self.config.endpoint_budget(), strategy.discover(endpoint)).await {
            Ok(Ok(agent)) => (agent, true),
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint.url, protocol = %endpoint.protocol, error = %e, "Discovery failed, using fallback");
                (strategy.fallback(endpoint, &e.to_string()), false)
            }
            Err(_) => {
                warn!(endpoint = %endpoint.url, protocol = %endpoint.protocol, "Discovery timed out, using fallback");
                (strategy.fallback(endpoint, "discovery timed out"), false)
            }
        }
    }
}
