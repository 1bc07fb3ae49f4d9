//! HTTP request handlers for the orchestrator API.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use orchestrator_core::{
    Agent, AgentResponse, AgentStatus, ProtocolType, RoutingDecision, RoutingRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ApiError,
    extractors::JsonBody,
    health::{self, HealthResponse, HealthStatus},
    state::AppState,
};

/// Route a query to the best agent and execute it.
///
/// Invalid requests are rejected with 422. Anything past validation
/// answers 200 with an `AgentResponse`, successful or not.
#[instrument(skip_all)]
pub async fn route(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RoutingRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    request.validate()?;
    let request = state.bound_deadline(request);
    let response = state.engine.route(&request).await;
    debug!(
        request_id = %response.request_id,
        agent_id = ?response.agent_id,
        success = response.success,
        "Routed request"
    );
    Ok(Json(response))
}

/// Make a routing decision without executing it
#[instrument(skip_all)]
pub async fn route_decision(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RoutingRequest>,
) -> Result<Json<RoutingDecision>, ApiError> {
    request.validate()?;
    let request = state.bound_deadline(request);
    let decision = state.engine.decide(&request).await?;
    Ok(Json(decision))
}

/// Filters for `GET /agents`
#[derive(Debug, Default, Deserialize)]
pub struct AgentQuery {
    /// Protocol name
    pub protocol: Option<String>,
    /// Status name
    pub status: Option<String>,
    /// Capability name, case-insensitive
    pub capability: Option<String>,
}

/// List agents, optionally filtered
#[instrument(skip(state))]
pub async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let protocol = query
        .protocol
        .as_deref()
        .map(str::parse::<ProtocolType>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<AgentStatus>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let snapshot = state.registry.snapshot();
    let agents = snapshot
        .iter()
        .filter(|a| protocol.map_or(true, |p| a.protocol == p))
        .filter(|a| status.map_or(true, |s| a.status == s))
        .filter(|a| query.capability.as_deref().map_or(true, |c| a.has_capability(c)))
        .cloned()
        .collect();

    Ok(Json(agents))
}

/// Capability name to agent ids
pub async fn capability_index(State(state): State<AppState>) -> Json<BTreeMap<String, Vec<String>>> {
    Json(state.registry.capability_index())
}

/// Get one agent by id
#[instrument(skip(state))]
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    state
        .registry
        .get(&agent_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Agent {agent_id} not found")))
}

/// Body of a refresh acknowledgement
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Always `refresh_triggered`
    pub status: &'static str,
    /// Human-readable message
    pub message: &'static str,
}

/// Trigger an out-of-cycle discovery pass
#[instrument(skip(state))]
pub async fn refresh_agents(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RefreshResponse>), ApiError> {
    let Some(scheduler) = state.scheduler.as_ref() else {
        return Err(ApiError::service_unavailable("Agent discovery is not running"));
    };

    if !scheduler.trigger_refresh() {
        warn!("Refresh requested after discovery stopped");
        return Err(ApiError::service_unavailable("Agent discovery has stopped"));
    }

    info!("Agent discovery refresh triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            status: "refresh_triggered",
            message: "Agent discovery refresh has been initiated",
        }),
    ))
}

/// Orchestrator health; 503 when unhealthy
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = health::assess(&state);
    let status = if report.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}

/// Static self-description
pub async fn capabilities(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "agent-orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Discovers agents across ACP, A2A, MCP and generic HTTP and routes queries to the best match",
        "protocols": state.engine.clients().protocols(),
        "oracle": state.engine.oracle_name(),
        "features": [
            "capability_discovery",
            "intelligent_routing",
            "fallback_chain",
            "circuit_breaking",
            "retry_with_backoff",
        ],
        "endpoints": [
            {"method": "POST", "path": "/route"},
            {"method": "POST", "path": "/route/decision"},
            {"method": "GET", "path": "/agents"},
            {"method": "GET", "path": "/agents/capabilities"},
            {"method": "GET", "path": "/agents/{agent_id}"},
            {"method": "POST", "path": "/agents/refresh"},
            {"method": "GET", "path": "/protocols"},
            {"method": "GET", "path": "/capabilities"},
            {"method": "GET", "path": "/status"},
            {"method": "GET", "path": "/health"},
            {"method": "GET", "path": "/metrics"},
        ],
    }))
}

/// One supported protocol
#[derive(Debug, Serialize)]
pub struct ProtocolInfo {
    /// Wire name
    pub name: ProtocolType,
    /// What the protocol is
    pub description: &'static str,
    /// Registered agents speaking it
    pub agent_count: usize,
}

const fn protocol_description(protocol: ProtocolType) -> &'static str {
    match protocol {
        ProtocolType::Acp => "Agent Communication Protocol",
        ProtocolType::A2a => "Agent-to-Agent protocol (JSON-RPC with agent cards)",
        ProtocolType::Mcp => "Model Context Protocol",
        ProtocolType::Custom => "Generic HTTP agents",
    }
}

/// Supported protocols with agent counts
pub async fn protocols(State(state): State<AppState>) -> Json<Vec<ProtocolInfo>> {
    let stats = state.registry.stats();
    let list = state
        .engine
        .clients()
        .protocols()
        .into_iter()
        .map(|p| ProtocolInfo {
            name: p,
            description: protocol_description(p),
            agent_count: stats.by_protocol.get(p.as_str()).copied().unwrap_or(0),
        })
        .collect();
    Json(list)
}

/// Scheduler, registry, engine and breaker state
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let discovery = state.scheduler.as_ref().map(|s| {
        json!({
            "state": s.state(),
            "cycles": s.cycles(),
            "interval_seconds": s.config().interval.as_secs(),
            "last_cycle": s.last_report(),
        })
    });

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.uptime_seconds(),
        "discovery": discovery,
        "registry": state.registry.stats(),
        "routing": state.engine.stats(),
        "circuit_breakers": state.engine.breaker_stats(),
        "timestamp": Utc::now(),
    }))
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Metrics are disabled"))?;
    let text = metrics
        .gather()
        .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {e}")))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}
