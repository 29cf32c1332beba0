//! Persisted push settings (`bealink_config.json`).

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{error, info, warn};

use crate::crypto::KeyMaterial;
use crate::error::{NotifyError, Result};

pub const MIN_RETRY_DELAY_SECS: i64 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: i64 = 10;
pub const DEFAULT_MAX_RETRIES: i64 = 5;

/// Everything the dispatcher needs to reach a Bark server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    /// Full device URL, e.g. `https://api.day.app/<device key>/`.
    pub bark_full_url: String,
    pub group: String,
    pub icon_url: String,
    pub sound: String,
    pub encryption_key: String,
    pub encryption_iv: String,
    pub retry_delay_sec: i64,
    pub max_retries: i64,
    pub notify_on_system_ready: bool,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            bark_full_url: String::new(),
            group: String::new(),
            icon_url: String::new(),
            sound: String::new(),
            encryption_key: String::new(),
            encryption_iv: String::new(),
            retry_delay_sec: DEFAULT_RETRY_DELAY_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            notify_on_system_ready: true,
        }
    }
}

/// Where to POST, and how.
#[derive(Debug, Clone)]
pub struct PushTarget {
    /// Parsed URL with any trailing slash removed.
    pub url: String,
    pub keys: KeyMaterial,
}

impl PushSettings {
    /// Clamp retry fields to usable values. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.retry_delay_sec < MIN_RETRY_DELAY_SECS {
            self.retry_delay_sec = MIN_RETRY_DELAY_SECS;
            changed = true;
        }
        if self.max_retries <= 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
            changed = true;
        }
        changed
    }

    /// Validate the push URL and classify the key material.
    ///
    /// # Errors
    ///
    /// `InvalidUrl` when the URL is empty, unparseable, or lacks a host.
    pub fn resolve_target(&self) -> Result<PushTarget> {
        let raw = self.bark_full_url.trim();
        if raw.is_empty() {
            return Err(NotifyError::InvalidUrl(
                "push URL is not configured".to_string(),
            ));
        }
        let parsed = Url::parse(raw)
            .map_err(|e| NotifyError::InvalidUrl(format!("'{raw}' does not parse: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifyError::InvalidUrl(format!(
                "'{raw}' must use http or https"
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(NotifyError::InvalidUrl(format!("'{raw}' has no host")));
        }

        Ok(PushTarget {
            url: parsed.as_str().trim_end_matches('/').to_string(),
            keys: self.key_material(),
        })
    }

    pub fn key_material(&self) -> KeyMaterial {
        KeyMaterial::from_settings(&self.encryption_key, &self.encryption_iv)
    }

    /// Attempts per notification, at least one.
    pub fn attempts(&self) -> u32 {
        u32::try_from(self.max_retries)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_RETRIES as u32)
    }

    /// Pause between attempts, never below the floor.
    pub fn retry_delay(&self) -> std::time::Duration {
        let secs = self.retry_delay_sec.max(MIN_RETRY_DELAY_SECS);
        std::time::Duration::from_secs(secs as u64)
    }
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

/// Shared, persisted `PushSettings`.
///
/// Readers get a snapshot; writers go through [`SettingsStore::update`],
/// which saves to disk before releasing the lock.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    inner: RwLock<PushSettings>,
}

impl SettingsStore {
    /// Load from `path`.
    ///
    /// A missing file is created with defaults. An unreadable or malformed
    /// file is logged and defaults are used; the file is left untouched so
    /// the user can fix it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<PushSettings>(&text) {
                Ok(mut settings) => {
                    if settings.normalize() {
                        info!(path = %path.display(), "retry settings out of range, corrected");
                    }
                    info!(path = %path.display(), "push settings loaded");
                    settings
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "push settings file is malformed, using defaults");
                    PushSettings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = PushSettings::default();
                match write_settings(&path, &settings) {
                    Ok(()) => info!(path = %path.display(), "created default push settings file"),
                    Err(e) => error!(path = %path.display(), error = %e, "could not create push settings file"),
                }
                settings
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not read push settings, using defaults");
                PushSettings::default()
            }
        };

        Self {
            path: Some(path),
            inner: RwLock::new(settings),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(settings: PushSettings) -> Self {
        Self {
            path: None,
            inner: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self) -> PushSettings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f`, normalize, persist, and return the new settings.
    ///
    /// The in-memory value is updated even if the save fails.
    pub fn update<F>(&self, f: F) -> Result<PushSettings>
    where
        F: FnOnce(&mut PushSettings),
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        guard.normalize();

        if let KeyMaterial::Invalid(reason) = guard.key_material() {
            warn!(%reason, "encryption will not be enabled");
        }

        let snapshot = guard.clone();
        if let Some(ref path) = self.path {
            write_settings(path, &snapshot)?;
            info!(path = %path.display(), "push settings saved");
        }
        Ok(snapshot)
    }
}

fn write_settings(path: &Path, settings: &PushSettings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)
        .map_err(|e| NotifyError::Settings(format!("write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> PushSettings {
        PushSettings {
            bark_full_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BeaLink").join("bealink_config.json");

        let store = SettingsStore::load(&path);
        assert_eq!(store.get(), PushSettings::default());
        assert!(path.exists());

        let on_disk: PushSettings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.retry_delay_sec, 10);
        assert_eq!(on_disk.max_retries, 5);
        assert!(on_disk.notify_on_system_ready);
    }

    #[test]
    fn load_corrects_out_of_range_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bealink_config.json");
        std::fs::write(
            &path,
            r#"{"bark_full_url":"https://api.day.app/k","retry_delay_sec":1,"max_retries":-2}"#,
        )
        .unwrap();

        let settings = SettingsStore::load(&path).get();
        assert_eq!(settings.retry_delay_sec, 5);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.bark_full_url, "https://api.day.app/k");
        // Absent fields take defaults.
        assert!(settings.notify_on_system_ready);
    }

    #[test]
    fn malformed_file_falls_back_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bealink_config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::load(&path);
        assert_eq!(store.get(), PushSettings::default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bealink_config.json");
        let store = SettingsStore::load(&path);

        let saved = store
            .update(|s| {
                s.group = "desk".to_string();
                s.max_retries = 0;
            })
            .unwrap();
        assert_eq!(saved.group, "desk");
        assert_eq!(saved.max_retries, 5);

        let reloaded = SettingsStore::load(&path).get();
        assert_eq!(reloaded.group, "desk");
    }

    #[test]
    fn in_memory_store_updates_without_a_file() {
        let store = SettingsStore::in_memory(PushSettings::default());
        store.update(|s| s.sound = "bell".to_string()).unwrap();
        assert_eq!(store.get().sound, "bell");
        assert!(store.path().is_none());
    }

    #[test]
    fn target_url_is_validated_and_trimmed() {
        let target = with_url("https://api.day.app/DEVICEKEY/")
            .resolve_target()
            .unwrap();
        assert_eq!(target.url, "https://api.day.app/DEVICEKEY");
        assert_eq!(target.keys, KeyMaterial::Disabled);

        for bad in ["", "   ", "api.day.app/key", "ftp://host/x", "https://"] {
            assert!(
                matches!(with_url(bad).resolve_target(), Err(NotifyError::InvalidUrl(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn bad_key_length_degrades_to_plaintext() {
        let settings = PushSettings {
            encryption_key: "abc".to_string(),
            encryption_iv: "fedcba9876543210".to_string(),
            ..with_url("https://api.day.app/k")
        };
        let target = settings.resolve_target().unwrap();
        assert!(matches!(target.keys, KeyMaterial::Invalid(_)));
    }

    #[test]
    fn attempts_and_delay_respect_floors() {
        let settings = PushSettings {
            retry_delay_sec: 2,
            max_retries: -1,
            ..Default::default()
        };
        assert_eq!(settings.attempts(), 5);
        assert_eq!(settings.retry_delay(), std::time::Duration::from_secs(5));
    }
}
