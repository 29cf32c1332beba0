//! Countdown toggles: `/sleep` and `/shutdown`.
//!
//! A request on an idle slot starts the countdown script; a request while
//! one is running kills it.

use axum::{extract::State, Json};
use bealink_tasks::{TaskOutcome, TaskSpec, SHUTDOWN_TASK, SLEEP_TASK};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use super::{task_error, ApiError};
use crate::app::AppState;

/// GET|POST /sleep
pub async fn sleep_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    toggle(&state, &SLEEP_TASK)
}

/// GET|POST /shutdown
pub async fn shutdown_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    toggle(&state, &SHUTDOWN_TASK)
}

fn toggle(state: &AppState, spec: &TaskSpec) -> Result<Json<Value>, ApiError> {
    let outcome = state.tracker.request(spec, &[]).map_err(|e| {
        error!(slot = spec.name, error = %e, "task toggle failed");
        task_error(&e)
    })?;

    let (status, message) = match (&outcome, spec.name) {
        (TaskOutcome::Started { .. }, "shutdown") => ("started", "Shutdown countdown started ⏳"),
        (TaskOutcome::Started { .. }, _) => ("started", "Sleep countdown started 😴"),
        (TaskOutcome::Cancelled { .. }, "shutdown") => ("cancelled", "Shutdown cancelled 🚫"),
        (TaskOutcome::Cancelled { .. }, _) => ("cancelled", "Sleep cancelled 💤"),
    };

    Ok(Json(json!({
        "status": status,
        "slot": outcome.slot(),
        "pid": outcome.pid(),
        "message": message,
    })))
}
