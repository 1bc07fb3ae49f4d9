//! Health assessment.

use chrono::{DateTime, Utc};
use orchestrator_discovery::SchedulerState;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::state::AppState;

/// Overall or per-component health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational
    Healthy,
    /// Serving, with reduced capacity
    Degraded,
    /// Not serving
    Unhealthy,
}

/// Health of one component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Status
    pub status: HealthStatus,
    /// Short explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    fn with(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Worst component status
    pub status: HealthStatus,
    /// Service version
    pub version: &'static str,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Per-component health
    pub components: BTreeMap<&'static str, ComponentHealth>,
    /// Time of assessment
    pub timestamp: DateTime<Utc>,
}

/// Assess orchestrator health from shared state
pub fn assess(state: &AppState) -> HealthResponse {
    let mut components = BTreeMap::new();

    components.insert("orchestrator", ComponentHealth::healthy());

    let discovery = match state.scheduler.as_ref().map(orchestrator_discovery::DiscoveryScheduler::state) {
        Some(SchedulerState::Running) => ComponentHealth::healthy(),
        Some(SchedulerState::Idle) => ComponentHealth::with(HealthStatus::Degraded, "discovery not started"),
        Some(SchedulerState::Stopped) => ComponentHealth::with(HealthStatus::Unhealthy, "discovery stopped"),
        None => ComponentHealth::with(HealthStatus::Degraded, "discovery disabled"),
    };
    components.insert("discovery", discovery);

    let stats = state.registry.stats();
    let agents = if stats.healthy_agents > 0 {
        ComponentHealth::healthy()
    } else if stats.total_agents > 0 {
        ComponentHealth::with(
            HealthStatus::Degraded,
            format!("0 of {} agents healthy", stats.total_agents),
        )
    } else {
        ComponentHealth::with(HealthStatus::Degraded, "no agents discovered")
    };
    components.insert("agents", agents);

    components.insert(
        "oracle",
        ComponentHealth::with(HealthStatus::Healthy, state.engine.oracle_name()),
    );

    let status = components
        .values()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Healthy);

    HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        components,
        timestamp: Utc::now(),
    }
}
