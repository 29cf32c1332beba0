use axum::{routing::get, Router};
use bealink_core::BealinkConfig;
use bealink_notify::{Dispatcher, NotifyOverrides, SYSTEM_READY_EVENT};
use bealink_tasks::{AhkRunner, ProcessLauncher, TaskTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::desktop::{Clipboard, MediaControl};
use crate::http;
use crate::logbuf::LogBuffer;

/// Shared by every handler as `Arc<AppState>`.
pub struct AppState {
    pub config: BealinkConfig,
    /// Port the listener actually bound.
    pub port: u16,
    pub tracker: TaskTracker,
    /// Also used directly for untracked scripts (`notify.ahk`).
    pub launcher: Arc<dyn ProcessLauncher>,
    pub dispatcher: Dispatcher,
    pub clipboard: Arc<dyn Clipboard>,
    pub media: MediaControl,
    pub logs: LogBuffer,
}

impl AppState {
    pub fn new(
        config: BealinkConfig,
        port: u16,
        launcher: Arc<dyn ProcessLauncher>,
        runner: Arc<dyn AhkRunner>,
        clipboard: Arc<dyn Clipboard>,
        dispatcher: Dispatcher,
        logs: LogBuffer,
    ) -> Self {
        Self {
            config,
            port,
            tracker: TaskTracker::new(Arc::clone(&launcher)),
            launcher,
            dispatcher,
            clipboard,
            media: MediaControl::new(runner),
            logs,
        }
    }
}

/// Announce the machine with a `system_ready` push once `delay` has passed.
pub fn spawn_ready_notice(state: Arc<AppState>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        debug!(?delay, "sending system ready notice");
        state
            .dispatcher
            .notify(SYSTEM_READY_EVENT, NotifyOverrides::default());
    })
}

/// Assemble the full Axum router.
///
/// Action endpoints accept GET as well as POST so they can be driven from
/// a browser bookmark or a phone shortcut.
pub fn build_router(state: Arc<AppState>) -> Router {
    use http::{clip, logs, media, notify, root, settings, tasks};

    Router::new()
        .route("/", get(root::root_handler))
        .route("/ping", get(root::ping_handler))
        .route("/health", get(root::health_handler))
        .route(
            "/sleep",
            get(tasks::sleep_handler).post(tasks::sleep_handler),
        )
        .route(
            "/shutdown",
            get(tasks::shutdown_handler).post(tasks::shutdown_handler),
        )
        .route("/clip", axum::routing::post(clip::clip_handler))
        .route("/getclip", get(clip::getclip_handler))
        .route(
            "/monitor",
            get(media::monitor_handler).post(media::monitor_handler),
        )
        .route("/volume/info", get(media::volume_info_handler))
        .route(
            "/volume/up",
            get(media::volume_up_handler).post(media::volume_up_handler),
        )
        .route(
            "/volume/down",
            get(media::volume_down_handler).post(media::volume_down_handler),
        )
        .route(
            "/volume/set",
            get(media::volume_set_handler).post(media::volume_set_handler),
        )
        .route(
            "/volume/mute",
            get(media::volume_mute_handler).post(media::volume_mute_handler),
        )
        .route(
            "/media/playpause",
            get(media::media_playpause_handler).post(media::media_playpause_handler),
        )
        .route(
            "/media/next",
            get(media::media_next_handler).post(media::media_next_handler),
        )
        .route(
            "/media/prev",
            get(media::media_prev_handler).post(media::media_prev_handler),
        )
        .route(
            "/setting",
            get(settings::settings_page_handler).post(settings::save_settings_handler),
        )
        .route("/test_bark", axum::routing::post(notify::test_bark_handler))
        .route("/debug", get(logs::debug_page_handler))
        .route("/ws/logs", get(logs::ws_logs_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::tests::RecordingRunner;
    use crate::desktop::ClipboardError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bealink_notify::{
        NotifyError, PushSettings, PushTransport, SettingsStore, TransportResponse,
    };
    use bealink_tasks::{ExitInfo, ProcessHandle, Result as TaskResult, TaskError};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    struct FakeProcess {
        pid: u32,
        killed: AtomicBool,
        exit: Notify,
    }

    #[async_trait]
    impl ProcessHandle for FakeProcess {
        fn pid(&self) -> u32 {
            self.pid
        }
        fn kill(&self) -> TaskResult<()> {
            self.killed.store(true, Ordering::SeqCst);
            self.exit.notify_one();
            Ok(())
        }
        async fn wait(&self) -> TaskResult<ExitInfo> {
            self.exit.notified().await;
            Ok(ExitInfo { code: None })
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        next_pid: AtomicU32,
        launched: Mutex<Vec<(String, Vec<String>, Arc<FakeProcess>)>>,
        missing_scripts: bool,
    }

    impl FakeLauncher {
        fn launched(&self) -> Vec<(String, Vec<String>, bool)> {
            self.launched
                .lock()
                .unwrap()
                .iter()
                .map(|(s, a, p)| (s.clone(), a.clone(), p.killed.load(Ordering::SeqCst)))
                .collect()
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&self, script: &str, args: &[String]) -> TaskResult<Arc<dyn ProcessHandle>> {
            if self.missing_scripts {
                return Err(TaskError::ScriptNotFound {
                    script: script.to_string(),
                    path: format!("/ahk/script/{script}"),
                });
            }
            let process = Arc::new(FakeProcess {
                pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
                killed: AtomicBool::new(false),
                exit: Notify::new(),
            });
            self.launched.lock().unwrap().push((
                script.to_string(),
                args.to_vec(),
                Arc::clone(&process),
            ));
            Ok(process)
        }
    }

    #[derive(Default)]
    struct MemoryClipboard {
        text: Mutex<String>,
    }

    #[async_trait]
    impl Clipboard for MemoryClipboard {
        async fn read_text(&self) -> Result<String, ClipboardError> {
            Ok(self.text.lock().unwrap().clone())
        }
        async fn write_text(&self, text: String) -> Result<(), ClipboardError> {
            *self.text.lock().unwrap() = text;
            Ok(())
        }
    }

    struct Offline;

    #[async_trait]
    impl PushTransport for Offline {
        async fn post_json(&self, _url: &str, _body: Vec<u8>) -> Result<TransportResponse, NotifyError> {
            Err(NotifyError::Http("offline".to_string()))
        }
    }

    struct Harness {
        router: Router,
        launcher: Arc<FakeLauncher>,
        clipboard: Arc<MemoryClipboard>,
        state: Arc<AppState>,
    }

    /// Answers every push with a Bark ack and keeps the bodies.
    #[derive(Default)]
    struct RecordingTransport {
        bodies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn post_json(&self, _url: &str, body: Vec<u8>) -> Result<TransportResponse, NotifyError> {
            self.bodies
                .lock()
                .unwrap()
                .push(String::from_utf8(body).unwrap());
            Ok(TransportResponse {
                status: 200,
                body: r#"{"code":200,"message":"success"}"#.to_string(),
            })
        }
    }

    fn harness_with(launcher: FakeLauncher, settings: PushSettings) -> Harness {
        harness_using(launcher, settings, Arc::new(Offline))
    }

    fn harness_using(
        launcher: FakeLauncher,
        settings: PushSettings,
        transport: Arc<dyn PushTransport>,
    ) -> Harness {
        let launcher = Arc::new(launcher);
        let clipboard = Arc::new(MemoryClipboard::default());
        let dispatcher = Dispatcher::new(Arc::new(SettingsStore::in_memory(settings)), transport)
            .with_hostname("desk-pc");
        let state = Arc::new(AppState::new(
            BealinkConfig::default(),
            8088,
            launcher.clone(),
            RecordingRunner::at("40"),
            clipboard.clone(),
            dispatcher,
            LogBuffer::new(16),
        ));
        Harness {
            router: build_router(Arc::clone(&state)),
            launcher,
            clipboard,
            state,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeLauncher::default(), PushSettings::default())
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, String) {
        let mut req = Request::builder().method(method).uri(uri);
        if method == "POST" {
            req = req.header("content-type", "application/json");
        }
        let resp = router
            .clone()
            .oneshot(req.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn json(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn sleep_toggles_start_then_cancel() {
        let h = harness();

        let (status, body) = call(&h.router, "POST", "/sleep", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let first = json(&body);
        assert_eq!(first["status"], "started");
        assert_eq!(first["slot"], "sleep");
        assert_eq!(first["pid"], 1000);

        let (status, body) = call(&h.router, "POST", "/sleep", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "cancelled");

        let launched = h.launcher.launched();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].0, "sleep_countdown.ahk");
        assert!(launched[0].2, "countdown process should be killed");
        assert_eq!(h.state.tracker.current_pid("sleep"), None);
    }

    #[tokio::test]
    async fn shutdown_uses_its_own_slot() {
        let h = harness();
        call(&h.router, "GET", "/sleep", Body::empty()).await;
        let (_, body) = call(&h.router, "GET", "/shutdown", Body::empty()).await;
        assert_eq!(json(&body)["status"], "started");
        assert_eq!(h.launcher.launched()[1].0, "shutdown_countdown.ahk");
    }

    #[tokio::test]
    async fn missing_script_is_a_server_error() {
        let h = harness_with(
            FakeLauncher {
                missing_scripts: true,
                ..Default::default()
            },
            PushSettings::default(),
        );
        let (status, body) = call(&h.router, "POST", "/shutdown", Body::empty()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&body)["code"], "SCRIPT_NOT_FOUND");
    }

    #[tokio::test]
    async fn clip_writes_clipboard_and_launches_toast() {
        let h = harness();
        let (status, body) = call(
            &h.router,
            "POST",
            "/clip",
            Body::from(r#"{"content":"hello from phone"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("hello from phone"));
        assert_eq!(*h.clipboard.text.lock().unwrap(), "hello from phone");

        let launched = h.launcher.launched();
        assert_eq!(launched[0].0, "notify.ahk");
        assert_eq!(launched[0].1, vec!["hello from phone".to_string()]);
    }

    #[tokio::test]
    async fn clip_rejects_empty_and_malformed_bodies() {
        let h = harness();
        let (status, _) = call(&h.router, "POST", "/clip", Body::from(r#"{"content":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&h.router, "POST", "/clip", Body::from("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.launcher.launched().is_empty());
    }

    #[tokio::test]
    async fn clip_succeeds_even_if_toast_script_is_missing() {
        let h = harness_with(
            FakeLauncher {
                missing_scripts: true,
                ..Default::default()
            },
            PushSettings::default(),
        );
        let (status, _) = call(&h.router, "POST", "/clip", Body::from(r#"{"content":"x"}"#)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn getclip_returns_plain_text() {
        let h = harness();
        let (status, body) = call(&h.router, "GET", "/getclip", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");

        *h.clipboard.text.lock().unwrap() = "copied on desktop".to_string();
        let (_, body) = call(&h.router, "GET", "/getclip", Body::empty()).await;
        assert_eq!(body, "copied on desktop");
    }

    #[tokio::test]
    async fn test_bark_without_url_is_bad_request() {
        let h = harness();
        let (status, body) = call(&h.router, "POST", "/test_bark", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("not configured"));
    }

    #[tokio::test]
    async fn test_bark_with_url_is_dispatched() {
        let h = harness_with(
            FakeLauncher::default(),
            PushSettings {
                bark_full_url: "https://api.day.app/KEY".to_string(),
                ..Default::default()
            },
        );
        let (status, _) = call(&h.router, "POST", "/test_bark", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn volume_set_requires_a_number() {
        let h = harness();
        let (status, _) = call(&h.router, "GET", "/volume/set", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&h.router, "GET", "/volume/set?value=250", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["volume"], 100);
    }

    #[tokio::test]
    async fn volume_info_reads_level() {
        let h = harness();
        let (_, body) = call(&h.router, "GET", "/volume/info", Body::empty()).await;
        assert_eq!(json(&body)["volume"], 40);
    }

    #[tokio::test]
    async fn settings_form_round_trip() {
        let h = harness();
        let req = Request::builder()
            .method("POST")
            .uri("/setting")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(
                "bark_full_url=https%3A%2F%2Fapi.day.app%2FKEY&group=desk&notify_on_system_ready=on&retry_delay_sec=20&max_retries=2",
            ))
            .unwrap();
        let resp = h.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let saved = h.state.dispatcher.settings().get();
        assert_eq!(saved.bark_full_url, "https://api.day.app/KEY");
        assert_eq!(saved.group, "desk");
        assert_eq!(saved.retry_delay_sec, 20);
        assert_eq!(saved.max_retries, 2);

        let (status, page) = call(&h.router, "GET", "/setting", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("value=\"desk\""));
    }

    #[tokio::test]
    async fn ping_health_and_banner() {
        let h = harness();
        let (_, body) = call(&h.router, "GET", "/ping", Body::empty()).await;
        assert!(body.starts_with("pong"));

        call(&h.router, "POST", "/sleep", Body::empty()).await;
        let (_, body) = call(&h.router, "GET", "/health", Body::empty()).await;
        let health = json(&body);
        assert_eq!(health["status"], "ok");
        assert_eq!(health["tasks"]["sleep"], 1000);
        assert_eq!(health["push_configured"], false);

        let (_, banner) = call(&h.router, "GET", "/", Body::empty()).await;
        assert!(banner.contains("8088"));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_notice_waits_for_delay_then_sends_once() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness_using(
            FakeLauncher::default(),
            PushSettings {
                bark_full_url: "https://api.day.app/KEY".to_string(),
                ..Default::default()
            },
            transport.clone(),
        );

        let delay = Duration::from_secs(2);
        let notice = spawn_ready_notice(Arc::clone(&h.state), delay);

        tokio::time::sleep(delay - Duration::from_millis(10)).await;
        assert!(transport.bodies.lock().unwrap().is_empty());

        notice.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let bodies = transport.bodies.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        let sent = json(&bodies[0]);
        assert_eq!(sent["title"], "Bealink");
        assert!(sent["body"].as_str().unwrap().contains("desk-pc"));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_notice_respects_settings_toggle() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness_using(
            FakeLauncher::default(),
            PushSettings {
                bark_full_url: "https://api.day.app/KEY".to_string(),
                notify_on_system_ready: false,
                ..Default::default()
            },
            transport.clone(),
        );

        spawn_ready_notice(Arc::clone(&h.state), Duration::from_secs(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.bodies.lock().unwrap().is_empty());
    }
}
