use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BIND: &str = "0.0.0.0";
/// Tried in order; the first port that binds wins.
pub const DEFAULT_PORTS: [u16; 4] = [8088, 8089, 8090, 8080];
pub const DEFAULT_LOG_BUFFER_LINES: usize = 200;
pub const SYSTEM_READY_DELAY_SECS: u64 = 2;
pub const CONFIG_FILE_NAME: &str = "bealink.toml";
pub const SETTINGS_FILE_NAME: &str = "bealink_config.json";
pub const SETTINGS_DIR_NAME: &str = "BeaLink";
pub const AHK_DIR_NAME: &str = "ahk";

/// Top-level config (bealink.toml + BEALINK_* env overrides).
///
/// Push-notification settings are not part of this file; they live in the
/// JSON settings file edited through `/setting` (see `bealink-notify`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BealinkConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ahk: AhkConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ports: default_ports(),
        }
    }
}

/// Location of the bundled AutoHotkey runtime.
///
/// Expected layout: `<dir>/AutoHotkey.exe` and `<dir>/script/*.ahk`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AhkConfig {
    /// Defaults to `<exe dir>/ahk`.
    pub dir: Option<String>,
}

impl AhkConfig {
    pub fn resolve_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => PathBuf::from(dir),
            None => exe_dir().join(AHK_DIR_NAME),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Path of the persisted push settings JSON.
    /// Defaults to `<user config dir>/BeaLink/bealink_config.json`.
    pub settings_path: Option<String>,
    /// Delay between the server coming up and the `system_ready` push.
    #[serde(default = "default_system_ready_delay")]
    pub system_ready_delay_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            settings_path: None,
            system_ready_delay_secs: SYSTEM_READY_DELAY_SECS,
        }
    }
}

impl NotifyConfig {
    pub fn resolve_settings_path(&self) -> PathBuf {
        if let Some(ref path) = self.settings_path {
            return PathBuf::from(path);
        }
        match dirs::config_dir() {
            Some(dir) => dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME),
            None => {
                tracing::warn!("no user config directory, settings will live in the working directory");
                PathBuf::from(SETTINGS_FILE_NAME)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Lines kept in memory for the `/debug` live log page.
    #[serde(default = "default_buffer_lines")]
    pub buffer_lines: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            buffer_lines: DEFAULT_LOG_BUFFER_LINES,
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_ports() -> Vec<u16> {
    DEFAULT_PORTS.to_vec()
}
fn default_system_ready_delay() -> u64 {
    SYSTEM_READY_DELAY_SECS
}
fn default_buffer_lines() -> usize {
    DEFAULT_LOG_BUFFER_LINES
}

impl BealinkConfig {
    /// Load config from a TOML file with BEALINK_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `BEALINK_GATEWAY__BIND`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);

        let config: BealinkConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BEALINK_").split("__"))
            .extract()
            .map_err(|e| crate::error::BealinkError::Config(e.to_string()))?;

        if config.gateway.ports.is_empty() {
            return Err(crate::error::BealinkError::Config(
                "gateway.ports must list at least one port".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Directory holding the running executable, or `.` when it cannot be found.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_config_path() -> PathBuf {
    exe_dir().join(CONFIG_FILE_NAME)
}
