//! Route definitions for the orchestrator API.

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use orchestrator_config::ServerConfig;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use std::time::Duration;
use tracing::warn;

use crate::{handlers, state::AppState};

/// Create the main API router
///
/// Routed requests are held to a deadline below the request timeout so a
/// slow agent still yields an `AgentResponse` instead of a bare 408.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let state = state.with_route_deadline(route_deadline(config.request_timeout));
    Router::new()
        // Health and introspection
        .route("/health", get(handlers::health_check))
        .route("/capabilities", get(handlers::capabilities))
        .route("/protocols", get(handlers::protocols))
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Routing
        .route("/route", post(handlers::route))
        .route("/route/decision", post(handlers::route_decision))
        .merge(agent_routes())
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Agent registry routes
fn agent_routes() -> Router<AppState> {
    Router::new()
        .route("/agents", get(handlers::list_agents))
        .route("/agents/capabilities", get(handlers::capability_index))
        .route("/agents/refresh", post(handlers::refresh_agents))
        .route("/agents/:agent_id", get(handlers::get_agent))
}

/// Request timeout less a tenth, leaving room to build the failure response
fn route_deadline(request_timeout: Duration) -> Duration {
    request_timeout.saturating_sub(request_timeout / 10)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}
