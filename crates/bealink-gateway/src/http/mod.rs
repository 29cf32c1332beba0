pub mod clip;
pub mod logs;
pub mod media;
pub mod notify;
pub mod root;
pub mod settings;
pub mod tasks;

use axum::{http::StatusCode, Json};
use bealink_tasks::TaskError;
use serde_json::{json, Value};

/// Error half of every JSON handler.
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Busy slot → 409, everything else from the task layer → 500.
pub fn task_error(e: &TaskError) -> ApiError {
    let status = match e {
        TaskError::SlotBusy(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": e.to_string(), "code": task_error_code(e) })),
    )
}

fn task_error_code(e: &TaskError) -> &'static str {
    match e {
        TaskError::ScriptNotFound { .. } => "SCRIPT_NOT_FOUND",
        TaskError::Spawn(_) => "SPAWN_FAILED",
        TaskError::Kill { .. } => "KILL_FAILED",
        TaskError::Wait(_) => "WAIT_FAILED",
        TaskError::SlotBusy(_) => "SLOT_BUSY",
        TaskError::AhkFailed(_) => "AHK_FAILED",
        TaskError::Timeout { .. } => "TIMEOUT",
        TaskError::IoError(_) => "IO_ERROR",
    }
}
