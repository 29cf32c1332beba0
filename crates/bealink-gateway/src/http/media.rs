//! Monitor power, volume and media keys.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use super::{api_error, task_error, ApiError};
use crate::app::AppState;
use crate::desktop::{MediaKey, VOLUME_STEP};

/// GET|POST /monitor
pub async fn monitor_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let off = state.media.toggle_monitor().await.map_err(|e| {
        error!(error = %e, "monitor toggle failed");
        task_error(&e)
    })?;
    let message = if off { "Monitor off 🌙" } else { "Monitor on ☀️" };
    Ok(Json(json!({ "monitor": if off { "off" } else { "on" }, "message": message })))
}

/// GET /volume/info
pub async fn volume_info_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let volume = state.media.volume().await.map_err(|e| task_error(&e))?;
    Ok(Json(json!({ "volume": volume })))
}

/// GET|POST /volume/up
pub async fn volume_up_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let volume = state
        .media
        .step_volume(VOLUME_STEP)
        .await
        .map_err(|e| task_error(&e))?;
    Ok(Json(json!({ "volume": volume })))
}

/// GET|POST /volume/down
pub async fn volume_down_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let volume = state
        .media
        .step_volume(-VOLUME_STEP)
        .await
        .map_err(|e| task_error(&e))?;
    Ok(Json(json!({ "volume": volume })))
}

#[derive(Deserialize)]
pub struct VolumeQuery {
    pub value: Option<String>,
}

/// GET|POST /volume/set?value=N: N is clamped to 0..=100.
pub async fn volume_set_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VolumeQuery>,
) -> Result<Json<Value>, ApiError> {
    let level: i64 = query
        .value
        .as_deref()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "value must be an integer 0-100"))?;
    let volume = state
        .media
        .set_volume(level)
        .await
        .map_err(|e| task_error(&e))?;
    Ok(Json(json!({ "volume": volume })))
}

/// GET|POST /volume/mute
pub async fn volume_mute_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let muted = state.media.toggle_mute().await.map_err(|e| task_error(&e))?;
    Ok(Json(json!({ "muted": muted })))
}

pub async fn media_playpause_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    press(&state, MediaKey::PlayPause).await
}

pub async fn media_next_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    press(&state, MediaKey::Next).await
}

pub async fn media_prev_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    press(&state, MediaKey::Prev).await
}

async fn press(state: &AppState, key: MediaKey) -> Result<Json<Value>, ApiError> {
    state.media.press(key).await.map_err(|e| {
        error!(?key, error = %e, "media key failed");
        task_error(&e)
    })?;
    Ok(Json(json!({ "ok": true })))
}
