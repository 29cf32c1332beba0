//! `/setting`: render and save the push settings form.

use axum::{extract::State, http::StatusCode, response::Html, Form};
use bealink_notify::{settings::MIN_RETRY_DELAY_SECS, KeyMaterial, PushSettings};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::app::AppState;

static SETTINGS_HTML: &str = include_str!("../../static/settings.html");

/// GET /setting
pub async fn settings_page_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render(&state.dispatcher.settings().get()))
}

/// Form fields as posted by the settings page (urlencoded).
/// Unchecked checkboxes are simply absent.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub bark_full_url: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub sound: String,
    pub use_encryption: Option<String>,
    #[serde(default)]
    pub encryption_key: String,
    #[serde(default)]
    pub encryption_iv: String,
    pub notify_on_system_ready: Option<String>,
    pub retry_delay_sec: Option<String>,
    pub max_retries: Option<String>,
}

/// POST /setting
pub async fn save_settings_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SettingsForm>,
) -> Result<&'static str, (StatusCode, String)> {
    state
        .dispatcher
        .settings()
        .update(|settings| apply_form(settings, form))
        .map_err(|e| {
            error!(error = %e, "saving push settings failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save settings.".to_string(),
            )
        })?;
    info!("push settings updated from the settings page");
    Ok("Settings saved.\n")
}

/// Merge a submitted form into `settings`.
///
/// Text fields are taken as-is (trimmed). Retry fields that are blank,
/// unparseable or out of range keep their previous value.
pub fn apply_form(settings: &mut PushSettings, form: SettingsForm) {
    settings.bark_full_url = form.bark_full_url.trim().to_string();
    settings.group = form.group.trim().to_string();
    settings.icon_url = form.icon_url.trim().to_string();
    settings.sound = form.sound.trim().to_string();

    if checked(&form.use_encryption) {
        settings.encryption_key = form.encryption_key.trim().to_string();
        settings.encryption_iv = form.encryption_iv.trim().to_string();
    } else {
        settings.encryption_key.clear();
        settings.encryption_iv.clear();
    }

    settings.notify_on_system_ready = checked(&form.notify_on_system_ready);

    if let Some(raw) = non_blank(&form.retry_delay_sec) {
        match raw.parse::<i64>() {
            Ok(v) if v >= MIN_RETRY_DELAY_SECS => settings.retry_delay_sec = v,
            _ => warn!(value = raw, kept = settings.retry_delay_sec, "invalid retry delay, keeping previous"),
        }
    }
    if let Some(raw) = non_blank(&form.max_retries) {
        match raw.parse::<i64>() {
            Ok(v) if v > 0 => settings.max_retries = v,
            _ => warn!(value = raw, kept = settings.max_retries, "invalid attempt count, keeping previous"),
        }
    }
}

fn checked(field: &Option<String>) -> bool {
    matches!(field.as_deref(), Some("on" | "true" | "1"))
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Fill the page template with escaped values.
pub fn render(settings: &PushSettings) -> String {
    let encryption_on = !settings.encryption_key.is_empty() || !settings.encryption_iv.is_empty();
    let status = match settings.key_material() {
        KeyMaterial::Disabled => "off".to_string(),
        KeyMaterial::Ready(_) => "active 🔒".to_string(),
        KeyMaterial::Invalid(reason) => format!("not active ({reason})"),
    };

    SETTINGS_HTML
        .replace("{{bark_full_url}}", &html_escape(&settings.bark_full_url))
        .replace("{{group}}", &html_escape(&settings.group))
        .replace("{{icon_url}}", &html_escape(&settings.icon_url))
        .replace("{{sound}}", &html_escape(&settings.sound))
        .replace("{{use_encryption_checked}}", if encryption_on { "checked" } else { "" })
        .replace("{{encryption_key}}", &html_escape(&settings.encryption_key))
        .replace("{{encryption_iv}}", &html_escape(&settings.encryption_iv))
        .replace("{{encryption_status}}", &html_escape(&status))
        .replace(
            "{{notify_on_system_ready_checked}}",
            if settings.notify_on_system_ready { "checked" } else { "" },
        )
        .replace("{{retry_delay_sec}}", &settings.retry_delay_sec.to_string())
        .replace("{{max_retries}}", &settings.max_retries.to_string())
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
