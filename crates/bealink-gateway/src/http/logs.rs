//! Live log viewer: `GET /debug` page and its `GET /ws/logs` feed.

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::{Html, IntoResponse},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::app::AppState;
use crate::logbuf::LogBuffer;

static DEBUG_HTML: &str = include_str!("../../static/debug.html");

/// GET /debug
pub async fn debug_page_handler() -> Html<&'static str> {
    Html(DEBUG_HTML)
}

/// GET /ws/logs: upgrade and stream log lines.
pub async fn ws_logs_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let logs = state.logs.clone();
    ws.on_upgrade(move |socket| stream_logs(socket, logs))
}

/// Replay the buffered lines, then forward new ones until the client leaves.
async fn stream_logs(socket: WebSocket, logs: LogBuffer) {
    let (mut tx, mut rx) = socket.split();
    let (backlog, mut live) = logs.attach();

    for line in backlog {
        if tx.send(Message::Text(line.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }

            line = live.recv() => {
                let text = match line {
                    Ok(line) => line,
                    Err(RecvError::Lagged(skipped)) => format!("… {skipped} log lines skipped"),
                    Err(RecvError::Closed) => break,
                };
                if tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
