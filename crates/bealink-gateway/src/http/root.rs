use axum::{extract::State, Json};
use bealink_notify::KeyMaterial;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /: plain-text banner.
pub async fn root_handler(State(state): State<Arc<AppState>>) -> String {
    format!(
        "Bealink agent running.\n\
         Listening on {bind}:{port} (http://localhost:{port})\n\
         Endpoints: /sleep, /shutdown, /clip, /getclip, /monitor, /volume/*, /media/*, \
         /ping, /health, /debug, /setting, /test_bark\n",
        bind = state.config.gateway.bind,
        port = state.port
    )
}

/// GET /ping
pub async fn ping_handler() -> &'static str {
    "pong 🏓"
}

/// GET /health: liveness probe with task and push status.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tasks: serde_json::Map<String, Value> = state
        .tracker
        .snapshot()
        .into_iter()
        .map(|(slot, pid)| (slot, json!(pid)))
        .collect();

    let settings = state.dispatcher.settings().get();
    let encryption = match settings.key_material() {
        KeyMaterial::Disabled => "off",
        KeyMaterial::Ready(_) => "active",
        KeyMaterial::Invalid(_) => "misconfigured",
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
        "tasks": tasks,
        "push_configured": settings.resolve_target().is_ok(),
        "encryption": encryption,
    }))
}
