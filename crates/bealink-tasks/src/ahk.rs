//! AutoHotkey integration.
//!
//! The agent ships `AutoHotkey.exe` next to itself:
//!
//! ```text
//! <ahk dir>/AutoHotkey.exe
//! <ahk dir>/script/sleep_countdown.ahk
//! <ahk dir>/script/shutdown_countdown.ahk
//! <ahk dir>/script/notify.ahk
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, TaskError};
use crate::process::{ChildProcess, ProcessHandle, ProcessLauncher};

pub const AHK_EXECUTABLE: &str = "AutoHotkey.exe";
pub const SCRIPT_DIR: &str = "script";

/// Upper bound for a stdin snippet (volume, media keys, monitor).
pub const SNIPPET_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// AhkLauncher
// ---------------------------------------------------------------------------

/// Launches script files from `<ahk dir>/script/` without waiting for them.
#[derive(Debug, Clone)]
pub struct AhkLauncher {
    ahk_dir: PathBuf,
}

impl AhkLauncher {
    pub fn new(ahk_dir: impl Into<PathBuf>) -> Self {
        Self {
            ahk_dir: ahk_dir.into(),
        }
    }

    pub fn executable(&self) -> PathBuf {
        self.ahk_dir.join(AHK_EXECUTABLE)
    }

    pub fn script_path(&self, script: &str) -> PathBuf {
        self.ahk_dir.join(SCRIPT_DIR).join(script)
    }
}

impl ProcessLauncher for AhkLauncher {
    fn launch(&self, script: &str, args: &[String]) -> Result<Arc<dyn ProcessHandle>> {
        let script_path = self.script_path(script);
        if !script_path.is_file() {
            return Err(TaskError::ScriptNotFound {
                script: script.to_string(),
                path: script_path.display().to_string(),
            });
        }

        let exe = self.executable();
        debug!(exe = %exe.display(), script = %script_path.display(), ?args, "launching AHK script");

        let mut cmd = Command::new(&exe);
        cmd.arg(&script_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let process = ChildProcess::spawn(cmd)?;
        info!(script, pid = process.pid(), "AHK script started");
        Ok(Arc::new(process))
    }
}

// ---------------------------------------------------------------------------
// AhkRunner
// ---------------------------------------------------------------------------

/// Runs a short AHK snippet to completion and returns its stdout.
#[async_trait]
pub trait AhkRunner: Send + Sync {
    async fn run(&self, script: &str) -> Result<String>;
}

/// Feeds the snippet to `AutoHotkey.exe /ErrorStdOut *` through stdin.
#[derive(Debug, Clone)]
pub struct StdinAhkRunner {
    executable: PathBuf,
    timeout: Duration,
}

impl StdinAhkRunner {
    pub fn new(ahk_dir: &Path) -> Self {
        Self {
            executable: ahk_dir.join(AHK_EXECUTABLE),
            timeout: Duration::from_secs(SNIPPET_TIMEOUT_SECS),
        }
    }

    /// Use an arbitrary interpreter that reads a script from stdin.
    pub fn with_executable(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }
}

#[async_trait]
impl AhkRunner for StdinAhkRunner {
    async fn run(&self, script: &str) -> Result<String> {
        let mut child = Command::new(&self.executable)
            .args(["/ErrorStdOut", "*"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TaskError::Spawn(format!("spawn failed: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
            // Dropping stdin closes the pipe so AHK starts executing.
        }

        // kill_on_drop reaps the child if the deadline wins.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(TaskError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let combined = [stdout, stderr]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            Err(TaskError::AhkFailed(if combined.is_empty() {
                format!("exit status {}", output.status)
            } else {
                combined
            }))
        }
    }
}
