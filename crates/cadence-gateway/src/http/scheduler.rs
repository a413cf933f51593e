//! Operator endpoints for the sweep scheduler.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use cadence_scheduler::{RecomputeReport, SchedulerError, SchedulerStatus, SweepReport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

type ApiError = (StatusCode, Json<Value>);

#[derive(Debug, Default, Deserialize)]
pub struct RecomputeParams {
    #[serde(default)]
    pub force: bool,
}

/// GET /scheduler/status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

/// POST /scheduler/start
pub async fn start_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let outcome = state.scheduler.start().await;
    info!(?outcome, "scheduler start requested over HTTP");
    Json(json!({ "ok": true, "outcome": outcome }))
}

/// POST /scheduler/stop
pub async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let was_running = state.scheduler.stop().await;
    info!(was_running, "scheduler stop requested over HTTP");
    Json(json!({ "ok": true, "was_running": was_running }))
}

/// POST /scheduler/sweep: run one pass now, waiting for any in-flight pass.
pub async fn sweep_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepReport>, ApiError> {
    state
        .scheduler
        .trigger_sweep_now()
        .await
        .map(Json)
        .map_err(|e| error_response("POST /scheduler/sweep", e))
}

/// POST /scheduler/recompute?force=<bool>
pub async fn recompute_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecomputeParams>,
) -> Result<Json<RecomputeReport>, ApiError> {
    state
        .scheduler
        .recompute_cycle_instants_now(params.force)
        .await
        .map(Json)
        .map_err(|e| error_response("POST /scheduler/recompute", e))
}

fn error_response(route: &str, e: SchedulerError) -> ApiError {
    let status = match &e {
        SchedulerError::Store(inner) if inner.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %e, code = e.code(), "{route} failed");
    (
        status,
        Json(json!({ "error": e.to_string(), "code": e.code() })),
    )
}
