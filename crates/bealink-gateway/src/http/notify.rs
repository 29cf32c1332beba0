use axum::{extract::State, http::StatusCode};
use bealink_notify::{NotifyOverrides, TEST_EVENT};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

/// POST /test_bark: push a fixed test notification.
///
/// Only URL problems are reported back; delivery happens in the background
/// and its result shows up in the log.
pub async fn test_bark_handler(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, String)> {
    if let Err(e) = state.dispatcher.check_target() {
        warn!(error = %e, "test notification requested without a usable push URL");
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Push is not configured: {e}"),
        ));
    }

    info!("test notification requested");
    state.dispatcher.notify(TEST_EVENT, NotifyOverrides::default());
    Ok("Test notification dispatched. Check your Bark app.\n")
}
