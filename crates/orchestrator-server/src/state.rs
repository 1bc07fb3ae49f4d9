//! Shared handler state.

use orchestrator_core::RoutingRequest;
use orchestrator_discovery::{AgentRegistry, DiscoveryScheduler};
use orchestrator_routing::RoutingEngine;
use orchestrator_telemetry::OrchestratorMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Routing engine
    pub engine: Arc<RoutingEngine>,
    /// Agent registry, shared with the engine and scheduler
    pub registry: Arc<AgentRegistry>,
    /// Discovery scheduler, absent when discovery is not running
    pub scheduler: Option<DiscoveryScheduler>,
    /// Prometheus metrics
    pub metrics: Option<Arc<OrchestratorMetrics>>,
    /// Process start, for uptime
    pub started_at: Instant,
    /// Longest deadline a routed request may run under
    pub route_deadline: Option<Duration>,
}

impl AppState {
    /// Create state around an engine
    pub fn new(engine: Arc<RoutingEngine>) -> Self {
        let registry = Arc::clone(engine.registry());
        Self {
            engine,
            registry,
            scheduler: None,
            metrics: None,
            started_at: Instant::now(),
            route_deadline: None,
        }
    }

    /// Attach the discovery scheduler
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: DiscoveryScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Attach metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Cap the deadline of routed requests
    #[must_use]
    pub fn with_route_deadline(mut self, deadline: Duration) -> Self {
        self.route_deadline = Some(deadline);
        self
    }

    /// Clamp the request deadline to `route_deadline`.
    ///
    /// Requests without a timeout get the engine default, clamped the same way.
    #[must_use]
    pub fn bound_deadline(&self, mut request: RoutingRequest) -> RoutingRequest {
        if let Some(cap) = self.route_deadline {
            let requested = request.timeout().unwrap_or_else(|| self.engine.default_timeout());
            if requested > cap {
                request.timeout_seconds = Some(cap.as_secs_f64());
            }
        }
        request
    }

    /// Seconds since startup
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("scheduler", &self.scheduler.as_ref().map(DiscoveryScheduler::state))
            .field("metrics", &self.metrics.is_some())
            .field("route_deadline", &self.route_deadline)
            .finish_non_exhaustive()
    }
}
