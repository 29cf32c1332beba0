//! `Dispatcher`: turns an event name into a Bark push.
//!
//! ```text
//! notify(event)
//!   ├─ settings → target URL + key material   (unusable URL: log, stop)
//!   ├─ system_ready gate                      (disabled: log, stop)
//!   ├─ rate limiter check-and-mark            (too soon: log, stop)
//!   ├─ event template + overrides/defaults    (unknown event: warn, stop)
//!   └─ tokio::spawn(deliver)                  (caller returns immediately)
//!        ├─ seal into {ciphertext, iv}        (failure: plaintext)
//!        └─ POST, retry on transport error / non-4xx status
//! ```
//!
//! Nothing here returns an error to the caller that triggered the event.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::crypto::{CipherKeys, KeyMaterial};
use crate::error::{NotifyError, Result};
use crate::events::{EventKind, TEST_EVENT};
use crate::limiter::RateLimiter;
use crate::payload::{EncryptedEnvelope, NotificationPayload, NotifyOverrides};
use crate::settings::{PushTarget, SettingsStore};
use crate::transport::PushTransport;

const UNKNOWN_HOST: &str = "unknown host";

/// A notification that passed every gate and is ready to send.
#[derive(Debug, Clone)]
pub struct PreparedNotification {
    event: String,
    url: String,
    payload: NotificationPayload,
    keys: Option<CipherKeys>,
    attempts: u32,
    retry_delay: Duration,
}

impl PreparedNotification {
    pub fn event(&self) -> &str {
        &self.event
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn payload(&self) -> &NotificationPayload {
        &self.payload
    }
    pub fn is_encrypted(&self) -> bool {
        self.keys.is_some()
    }
}

/// How a delivery run ended. Only ever logged in production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx with a Bark acknowledgement (`{"code":200,...}`).
    Delivered { attempts: u32 },
    /// 2xx whose body was not a recognisable acknowledgement.
    Accepted { attempts: u32 },
    /// 4xx: a configuration problem, not retried.
    Rejected { attempts: u32, status: u16 },
    /// Every attempt failed.
    GaveUp { attempts: u32 },
    /// The body could not be serialised; nothing was sent.
    Abandoned,
}

#[derive(Debug, Deserialize)]
struct BarkAck {
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct Dispatcher {
    settings: Arc<SettingsStore>,
    transport: Arc<dyn PushTransport>,
    limiter: RateLimiter,
    hostname: String,
}

impl Dispatcher {
    pub fn new(settings: Arc<SettingsStore>, transport: Arc<dyn PushTransport>) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());
        Self {
            settings,
            transport,
            limiter: RateLimiter::default(),
            hostname,
        }
    }

    /// Replace the host name used in the `system_ready` text.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Whether the current settings can reach a push server at all.
    pub fn check_target(&self) -> Result<PushTarget> {
        self.settings.get().resolve_target()
    }

    /// Fire-and-forget. Delivery runs on a spawned task whose result is
    /// only visible in the log.
    pub fn notify(&self, event: &str, overrides: NotifyOverrides) {
        let Some(prepared) = self.prepare(event, overrides) else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            deliver(transport.as_ref(), &prepared).await;
        });
    }

    /// Same gates as [`Dispatcher::notify`] but awaits delivery.
    /// `None` means a gate stopped the event.
    pub async fn notify_and_wait(
        &self,
        event: &str,
        overrides: NotifyOverrides,
    ) -> Option<DeliveryOutcome> {
        let prepared = self.prepare(event, overrides)?;
        Some(deliver(self.transport.as_ref(), &prepared).await)
    }

    /// Run every gate and build the payload.
    pub fn prepare(&self, event: &str, overrides: NotifyOverrides) -> Option<PreparedNotification> {
        let settings = self.settings.get();

        let target = match settings.resolve_target() {
            Ok(target) => target,
            Err(e) => {
                if event == TEST_EVENT {
                    warn!(event, error = %e, "push not configured, notification not sent");
                } else {
                    info!(event, error = %e, "push not configured, notification not sent");
                }
                return None;
            }
        };

        let keys = match target.keys {
            KeyMaterial::Ready(keys) => Some(keys),
            KeyMaterial::Disabled => None,
            KeyMaterial::Invalid(reason) => {
                warn!(event, %reason, "encryption settings unusable, sending in plaintext");
                None
            }
        };

        let kind = EventKind::parse(event);
        if kind == Some(EventKind::SystemReady) && !settings.notify_on_system_ready {
            info!(event, "system ready notifications are disabled");
            return None;
        }

        if !self.limiter.try_acquire(event) {
            info!(event, "notification triggered too often, skipped");
            return None;
        }

        let Some(kind) = kind else {
            warn!(event, "unknown notification event, not sent");
            return None;
        };

        let (title, body) = kind.template(&self.hostname, keys.is_some());
        let payload = NotificationPayload {
            title,
            body,
            group: or_default(overrides.group, &settings.group),
            icon: or_default(overrides.icon, &settings.icon_url),
            sound: or_default(overrides.sound, &settings.sound),
            url: overrides.url,
            copy: overrides.copy,
            auto_copy: flag(overrides.auto_copy),
            is_archive: flag(overrides.is_archive),
        };

        Some(PreparedNotification {
            event: event.to_string(),
            url: target.url,
            payload,
            keys,
            attempts: settings.attempts(),
            retry_delay: settings.retry_delay(),
        })
    }
}

fn or_default(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn flag(on: bool) -> String {
    if on {
        "1".to_string()
    } else {
        String::new()
    }
}

/// JSON body for `n`: the sealed envelope when keys are present, the plain
/// payload otherwise or when sealing fails.
pub fn encode_body(n: &PreparedNotification) -> Result<Vec<u8>> {
    if let Some(ref keys) = n.keys {
        match EncryptedEnvelope::seal(&n.payload, keys) {
            Ok(envelope) => {
                info!(event = %n.event, url = %n.url, iv = %envelope.iv, "push payload encrypted");
                return Ok(serde_json::to_vec(&envelope)?);
            }
            Err(e) => {
                warn!(event = %n.event, error = %e, "encryption failed, sending in plaintext");
            }
        }
    }
    debug!(event = %n.event, url = %n.url, "push payload not encrypted");
    Ok(serde_json::to_vec(&n.payload)?)
}

/// POST `n` with the retry policy.
///
/// - transport error or non-4xx status: wait `retry_delay`, try again
/// - 4xx: stop at once
/// - 2xx: done, whether or not the body is a Bark acknowledgement
pub async fn deliver(transport: &dyn PushTransport, n: &PreparedNotification) -> DeliveryOutcome {
    let body = match encode_body(n) {
        Ok(body) => body,
        Err(e) => {
            error!(event = %n.event, error = %e, "could not serialise push payload");
            return DeliveryOutcome::Abandoned;
        }
    };

    let max = n.attempts.max(1);
    for attempt in 1..=max {
        debug!(event = %n.event, title = %n.payload.title, attempt, max, "sending push notification");

        match transport.post_json(&n.url, body.clone()).await {
            Err(e) => {
                warn!(event = %n.event, attempt, max, error = %e, "push request failed");
            }
            Ok(resp) if (200..300).contains(&resp.status) => {
                return match serde_json::from_str::<BarkAck>(&resp.body) {
                    Ok(ack) if ack.code == 200 => {
                        info!(event = %n.event, attempt, message = %ack.message, "push notification delivered");
                        DeliveryOutcome::Delivered { attempts: attempt }
                    }
                    _ => {
                        info!(
                            event = %n.event,
                            attempt,
                            status = resp.status,
                            body = %resp.body,
                            "push accepted but acknowledgement not understood"
                        );
                        DeliveryOutcome::Accepted { attempts: attempt }
                    }
                };
            }
            Ok(resp) => {
                let err = NotifyError::Status {
                    status: resp.status,
                    body: resp.body,
                };
                warn!(event = %n.event, attempt, max, error = %err, "push server refused notification");
                if (400..500).contains(&resp.status) {
                    warn!(event = %n.event, status = resp.status, "4xx usually means a settings problem, not retrying");
                    return DeliveryOutcome::Rejected {
                        attempts: attempt,
                        status: resp.status,
                    };
                }
            }
        }

        if attempt < max {
            tokio::time::sleep(n.retry_delay).await;
        }
    }

    error!(event = %n.event, title = %n.payload.title, attempts = max, "giving up on push notification");
    DeliveryOutcome::GaveUp { attempts: max }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PushSettings;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const OK_ACK: &str = r#"{"code":200,"message":"success","timestamp":1}"#;

    /// Replays scripted responses and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<TransportResponse>>>,
        requests: Mutex<Vec<(String, Vec<u8>, tokio::time::Instant)>>,
    }

    impl ScriptedTransport {
        fn with(replies: Vec<Result<TransportResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            })
        }

        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_json(&self) -> serde_json::Value {
            let requests = self.requests.lock().unwrap();
            serde_json::from_slice(&requests.last().unwrap().1).unwrap()
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<TransportResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), body, tokio::time::Instant::now()));
            self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(TransportResponse {
                    status: 200,
                    body: OK_ACK.to_string(),
                })
            })
        }
    }

    fn status(code: u16) -> Result<TransportResponse> {
        Ok(TransportResponse {
            status: code,
            body: String::new(),
        })
    }

    fn configured() -> PushSettings {
        PushSettings {
            bark_full_url: "https://api.day.app/DEVICE/".to_string(),
            group: "bealink".to_string(),
            ..Default::default()
        }
    }

    fn dispatcher(settings: PushSettings, transport: Arc<ScriptedTransport>) -> Dispatcher {
        Dispatcher::new(Arc::new(SettingsStore::in_memory(settings)), transport)
            .with_hostname("DESKTOP-1")
    }

    #[tokio::test(start_paused = true)]
    async fn wakeup_twice_within_window_sends_once() {
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(configured(), transport.clone());

        assert!(d.notify_and_wait("wakeup", NotifyOverrides::default()).await.is_some());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(d.notify_and_wait("wakeup", NotifyOverrides::default()).await.is_none());
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wakeup_spaced_past_window_sends_twice() {
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(configured(), transport.clone());

        d.notify_and_wait("wakeup", NotifyOverrides::default()).await;
        tokio::time::advance(Duration::from_millis(2100)).await;
        d.notify_and_wait("wakeup", NotifyOverrides::default()).await;
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_is_never_rate_limited() {
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(configured(), transport.clone());

        for _ in 0..4 {
            d.notify_and_wait("test", NotifyOverrides::default()).await;
        }
        assert_eq!(transport.count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_retry_until_success() {
        let settings = PushSettings {
            max_retries: 4,
            retry_delay_sec: 7,
            ..configured()
        };
        let transport = ScriptedTransport::with(vec![status(500), status(502), status(503)]);
        let d = dispatcher(settings, transport.clone());

        let outcome = d.notify_and_wait("test", NotifyOverrides::default()).await;
        assert_eq!(outcome, Some(DeliveryOutcome::Delivered { attempts: 4 }));
        assert_eq!(transport.count(), 4);

        let requests = transport.requests.lock().unwrap();
        let gap = requests[1].2 - requests[0].2;
        assert!(gap >= Duration::from_secs(7), "retried after {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_not_retried() {
        let transport = ScriptedTransport::with(vec![status(400)]);
        let d = dispatcher(configured(), transport.clone());

        let outcome = d.notify_and_wait("test", NotifyOverrides::default()).await;
        assert_eq!(
            outcome,
            Some(DeliveryOutcome::Rejected {
                attempts: 1,
                status: 400
            })
        );
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_exhaust_retries() {
        let settings = PushSettings {
            max_retries: 3,
            ..configured()
        };
        let failures = (0..3)
            .map(|_| Err(NotifyError::Http("connection refused".to_string())))
            .collect();
        let transport = ScriptedTransport::with(failures);
        let d = dispatcher(settings, transport.clone());

        let outcome = d.notify_and_wait("test", NotifyOverrides::default()).await;
        assert_eq!(outcome, Some(DeliveryOutcome::GaveUp { attempts: 3 }));
        assert_eq!(transport.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unparsable_ack_still_counts_as_sent() {
        let transport = ScriptedTransport::with(vec![Ok(TransportResponse {
            status: 200,
            body: "<html>ok</html>".to_string(),
        })]);
        let d = dispatcher(configured(), transport.clone());

        let outcome = d.notify_and_wait("test", NotifyOverrides::default()).await;
        assert_eq!(outcome, Some(DeliveryOutcome::Accepted { attempts: 1 }));
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn short_key_sends_plaintext() {
        let settings = PushSettings {
            encryption_key: "abc".to_string(),
            encryption_iv: "fedcba9876543210".to_string(),
            ..configured()
        };
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(settings, transport.clone());

        let outcome = d.notify_and_wait("test", NotifyOverrides::default()).await;
        assert_eq!(outcome, Some(DeliveryOutcome::Delivered { attempts: 1 }));

        let json = transport.last_json();
        assert!(json.get("ciphertext").is_none());
        assert_eq!(json["title"], crate::events::TEST_TITLE);
    }

    #[tokio::test]
    async fn encrypted_send_carries_only_envelope() {
        let settings = PushSettings {
            encryption_key: "0123456789abcdef".to_string(),
            encryption_iv: "fedcba9876543210".to_string(),
            ..configured()
        };
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(settings.clone(), transport.clone());

        d.notify_and_wait("system_ready", NotifyOverrides::default()).await;

        let json = transport.last_json();
        assert_eq!(json["iv"], "fedcba9876543210");
        assert!(json.get("title").is_none());

        let envelope: EncryptedEnvelope = serde_json::from_value(json).unwrap();
        let keys = settings.key_material();
        let payload = envelope.open(keys.keys().unwrap()).unwrap();
        assert_eq!(payload.title, "Bealink");
        assert_eq!(payload.body, "💻 Host DESKTOP-1 is ready");
        assert_eq!(payload.group, "bealink");
    }

    #[tokio::test]
    async fn missing_url_sends_nothing() {
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(PushSettings::default(), transport.clone());

        assert!(d.notify_and_wait("test", NotifyOverrides::default()).await.is_none());
        assert!(d.check_target().is_err());
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn system_ready_respects_toggle() {
        let settings = PushSettings {
            notify_on_system_ready: false,
            ..configured()
        };
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(settings, transport.clone());

        assert!(d.notify_and_wait("system_ready", NotifyOverrides::default()).await.is_none());
        // The test event is not affected by the toggle.
        assert!(d.notify_and_wait("test", NotifyOverrides::default()).await.is_some());
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn unknown_event_is_rejected() {
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(configured(), transport.clone());

        assert!(d.prepare("reboot", NotifyOverrides::default()).is_none());
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn overrides_win_over_defaults() {
        let settings = PushSettings {
            icon_url: "https://example.com/i.png".to_string(),
            sound: "bell".to_string(),
            ..configured()
        };
        let d = dispatcher(settings, ScriptedTransport::with(vec![]));

        let prepared = d
            .prepare(
                "test",
                NotifyOverrides {
                    sound: "alarm".to_string(),
                    copy: "hello".to_string(),
                    auto_copy: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let payload = prepared.payload();
        assert_eq!(payload.sound, "alarm");
        assert_eq!(payload.icon, "https://example.com/i.png");
        assert_eq!(payload.group, "bealink");
        assert_eq!(payload.copy, "hello");
        assert_eq!(payload.auto_copy, "1");
        assert!(payload.is_archive.is_empty());
        assert_eq!(prepared.url(), "https://api.day.app/DEVICE");
        assert!(!prepared.is_encrypted());
    }

    #[tokio::test]
    async fn notify_returns_before_delivery() {
        let transport = ScriptedTransport::with(vec![]);
        let d = dispatcher(configured(), transport.clone());

        d.notify("test", NotifyOverrides::default());
        // Nothing has run yet on this single-threaded runtime.
        assert_eq!(transport.count(), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.count(), 1);
    }
}
