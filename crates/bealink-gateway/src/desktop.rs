//! Desktop collaborators: system clipboard and AHK-driven media controls.

use async_trait::async_trait;
use bealink_tasks::{AhkRunner, TaskError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Clipboard
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("clipboard task failed: {0}")]
    Join(String),
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Current text; an empty or non-text clipboard reads as `""`.
    async fn read_text(&self) -> Result<String, ClipboardError>;
    async fn write_text(&self, text: String) -> Result<(), ClipboardError>;
}

/// System clipboard through `arboard`, one handle per call on a blocking
/// thread (the OS clipboard may block while another app holds it).
pub struct ArboardClipboard;

#[async_trait]
impl Clipboard for ArboardClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        tokio::task::spawn_blocking(|| {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            match clipboard.get_text() {
                Ok(text) => Ok(text),
                Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
                Err(e) => Err(ClipboardError::Unavailable(e.to_string())),
            }
        })
        .await
        .map_err(|e| ClipboardError::Join(e.to_string()))?
    }

    async fn write_text(&self, text: String) -> Result<(), ClipboardError> {
        tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            clipboard
                .set_text(text)
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))
        })
        .await
        .map_err(|e| ClipboardError::Join(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Media / volume / monitor
// ---------------------------------------------------------------------------

pub const VOLUME_STEP: i16 = 5;
pub const VOLUME_CACHE_TTL: Duration = Duration::from_millis(200);

const GET_VOLUME: &str = "SoundGet, v\nFileAppend, %v%, *";
const TOGGLE_MUTE: &str = "SoundSet, +1, , mute\nSoundGet, m, , mute\nFileAppend, %m%, *";
const MONITOR_OFF: &str = "SendMessage, 0x112, 0xF170, 2,, Program Manager";
// -1 powers the display back on; the mouse nudge wakes panels that ignore it.
const MONITOR_ON: &str = "SendMessage, 0x112, 0xF170, -1,, Program Manager\n\
                          MouseMove, 0, 1, 0, R\n\
                          MouseMove, 0, -1, 0, R";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    PlayPause,
    Next,
    Prev,
}

impl MediaKey {
    fn snippet(self) -> &'static str {
        match self {
            Self::PlayPause => "Send {Media_Play_Pause}",
            Self::Next => "Send {Media_Next}",
            Self::Prev => "Send {Media_Prev}",
        }
    }
}

/// Volume, mute, media keys and monitor power, each a short AHK snippet.
pub struct MediaControl {
    runner: Arc<dyn AhkRunner>,
    volume: Mutex<Option<(u8, Instant)>>,
    monitor_off: AtomicBool,
}

impl MediaControl {
    pub fn new(runner: Arc<dyn AhkRunner>) -> Self {
        Self {
            runner,
            volume: Mutex::new(None),
            monitor_off: AtomicBool::new(false),
        }
    }

    /// Master volume 0..=100, served from cache if read within the TTL.
    pub async fn volume(&self) -> Result<u8, TaskError> {
        if let Some((level, at)) = *self.cache() {
            if at.elapsed() < VOLUME_CACHE_TTL {
                return Ok(level);
            }
        }
        let out = self.runner.run(GET_VOLUME).await?;
        let level = parse_volume(&out)?;
        self.remember(level);
        Ok(level)
    }

    pub async fn set_volume(&self, level: i64) -> Result<u8, TaskError> {
        let level = level.clamp(0, 100) as u8;
        self.runner.run(&format!("SoundSet, {level}")).await?;
        self.remember(level);
        info!(level, "volume set");
        Ok(level)
    }

    pub async fn step_volume(&self, delta: i16) -> Result<u8, TaskError> {
        let current = self.volume().await?;
        self.set_volume(i64::from(current) + i64::from(delta)).await
    }

    /// Toggle mute; returns true when now muted.
    pub async fn toggle_mute(&self) -> Result<bool, TaskError> {
        let out = self.runner.run(TOGGLE_MUTE).await?;
        let muted = out.trim().eq_ignore_ascii_case("on");
        info!(muted, "mute toggled");
        Ok(muted)
    }

    pub async fn press(&self, key: MediaKey) -> Result<(), TaskError> {
        self.runner.run(key.snippet()).await?;
        debug!(?key, "media key sent");
        Ok(())
    }

    /// Turn the monitor off if we last turned it on, and vice versa.
    /// Returns true when the monitor is now off.
    pub async fn toggle_monitor(&self) -> Result<bool, TaskError> {
        let turn_off = !self.monitor_off.load(Ordering::SeqCst);
        self.runner
            .run(if turn_off { MONITOR_OFF } else { MONITOR_ON })
            .await?;
        self.monitor_off.store(turn_off, Ordering::SeqCst);
        info!(off = turn_off, "monitor power toggled");
        Ok(turn_off)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<(u8, Instant)>> {
        self.volume.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, level: u8) {
        *self.cache() = Some((level, Instant::now()));
    }
}

fn parse_volume(out: &str) -> Result<u8, TaskError> {
    let raw: f64 = out
        .trim()
        .parse()
        .map_err(|_| TaskError::AhkFailed(format!("unexpected volume output {out:?}")))?;
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}
