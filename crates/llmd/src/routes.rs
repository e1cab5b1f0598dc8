//! API routes for llmd
//!
//! Unknown service names answer 400 on every route. Lifecycle failures
//! answer 500 with the error kind and any captured script output.

use crate::error::LifecycleError;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use llm_common::{HealthResponse, LifecycleOp, LifecycleResponse, ServiceStatus, ServicesStatusResponse};
use std::sync::Arc;
use tracing::info;

type AppStateArc = Arc<AppState>;

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health_check))
}

/// Daemon liveness plus the cached per-service state; never probes services
async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        services: state.controller.snapshot_all().await,
    })
}

// ============================================================================
// Service Routes
// ============================================================================

pub fn service_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/services/status", get(services_status))
        .route("/services/:name/status", get(service_status))
        .route("/services/:name/start", post(start_service))
        .route("/services/:name/stop", post(stop_service))
        .route("/services/:name/restart", post(restart_service))
}

async fn services_status(State(state): State<AppStateArc>) -> Json<ServicesStatusResponse> {
    Json(state.controller.status_all().await)
}

async fn service_status(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
) -> Result<Json<ServiceStatus>, LifecycleError> {
    Ok(Json(state.controller.status(&name).await?))
}

async fn start_service(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
) -> Result<Json<LifecycleResponse>, LifecycleError> {
    lifecycle(&state, &name, LifecycleOp::Start).await
}

async fn stop_service(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
) -> Result<Json<LifecycleResponse>, LifecycleError> {
    lifecycle(&state, &name, LifecycleOp::Stop).await
}

async fn restart_service(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
) -> Result<Json<LifecycleResponse>, LifecycleError> {
    lifecycle(&state, &name, LifecycleOp::Restart).await
}

async fn lifecycle(
    state: &AppState,
    name: &str,
    op: LifecycleOp,
) -> Result<Json<LifecycleResponse>, LifecycleError> {
    info!("  {} requested for {}", op, name);
    let outcome = state.controller.run(name, op).await?;
    Ok(Json(outcome.to_response()))
}
