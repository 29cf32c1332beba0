use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::app::AppState;

/// Shows a toast with the copied text; launched fire-and-forget.
pub const NOTIFY_SCRIPT: &str = "notify.ahk";

#[derive(Deserialize)]
pub struct ClipRequest {
    #[serde(default)]
    pub content: String,
}

/// POST /clip: `{"content": "..."}` onto the system clipboard.
pub async fn clip_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ClipRequest>, JsonRejection>,
) -> Result<String, (StatusCode, String)> {
    let Json(req) = body.map_err(|e| {
        warn!(error = %e, "/clip body rejected");
        (
            StatusCode::BAD_REQUEST,
            "Body must be JSON {\"content\":\"...\"}".to_string(),
        )
    })?;

    if req.content.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Clipboard content is empty ✨".to_string(),
        ));
    }

    state
        .clipboard
        .write_text(req.content.clone())
        .await
        .map_err(|e| {
            error!(error = %e, "clipboard write failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to write clipboard ❌".to_string(),
            )
        })?;

    info!(chars = req.content.chars().count(), "text copied to clipboard");

    if let Err(e) = state
        .launcher
        .launch(NOTIFY_SCRIPT, std::slice::from_ref(&req.content))
    {
        warn!(error = %e, "clipboard toast script did not start");
    }

    Ok(format!("Copied to clipboard 📋: {}\n", req.content))
}

/// GET /getclip: clipboard text as `text/plain`.
pub async fn getclip_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let text = state.clipboard.read_text().await.map_err(|e| {
        error!(error = %e, "clipboard read failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read clipboard".to_string(),
        )
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}
