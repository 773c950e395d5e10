//! HTTP request handlers.

use super::AppState;
use crate::export;
use crate::scheduler::SchedulerError;
use crate::store::TargetSpec;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub target: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

fn error_response(e: SchedulerError) -> Response {
    let status = match &e {
        SchedulerError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        SchedulerError::AlreadyRunning
        | SchedulerError::NotRunning
        | SchedulerError::AlreadyWatching(_) => StatusCode::CONFLICT,
        SchedulerError::Probe(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

// ============================================================================
// Snapshot API
// ============================================================================

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.status())
}

pub async fn handle_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.snapshot())
}

pub async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> impl IntoResponse {
    match state.scheduler.store().history(&query.target) {
        Some(history) => Json(history).into_response(),
        None => (StatusCode::NOT_FOUND, "Unknown target").into_response(),
    }
}

pub async fn handle_export(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> impl IntoResponse {
    let history = match state.scheduler.store().history(&query.target) {
        Some(h) if !h.is_empty() => h,
        Some(_) => return (StatusCode::NOT_FOUND, "No samples yet").into_response(),
        None => return (StatusCode::NOT_FOUND, "Unknown target").into_response(),
    };

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::history_file_name(&query.target, &history)
    );
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export::to_csv(&history),
    )
        .into_response()
}

// ============================================================================
// Commands
// ============================================================================

/// Start with the targets in the body, or the configured ones when absent.
pub async fn handle_start(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let specs = match body {
        Some(Json(req)) if !req.targets.is_empty() => req.targets,
        _ => state.config.target_specs(),
    };

    match state.scheduler.start(specs) {
        Ok(_) => Json(state.scheduler.status()).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_stop(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.stop();
    Json(state.scheduler.status())
}

pub async fn handle_add_target(
    State(state): State<AppState>,
    Json(spec): Json<TargetSpec>,
) -> impl IntoResponse {
    match state.scheduler.add_target(spec) {
        Ok(()) => (StatusCode::CREATED, Json(state.scheduler.status())).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_remove_target(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> impl IntoResponse {
    if state.scheduler.remove_target(&query.target) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
