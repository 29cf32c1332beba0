//! Process handle abstraction.
//!
//! The tracker only sees `ProcessHandle` / `ProcessLauncher`, so it has no
//! idea whether it is driving AutoHotkey on Windows, a shell on Linux, or a
//! fake in a unit test.

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{Result, TaskError};
use crate::types::ExitInfo;

/// A running external process.
///
/// `kill` and `wait` may be called concurrently: the reaper parks in `wait`
/// while a request thread issues `kill`.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> u32;

    /// Hard-kill the process. Synchronous, no timeout.
    fn kill(&self) -> Result<()>;

    /// Block until the process exits.
    async fn wait(&self) -> Result<ExitInfo>;
}

/// Spawns a named script and returns without waiting for it.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, script: &str, args: &[String]) -> Result<Arc<dyn ProcessHandle>>;
}

// ---------------------------------------------------------------------------
// ChildProcess
// ---------------------------------------------------------------------------

/// `ProcessHandle` over a `tokio::process::Child`.
///
/// The child sits behind an async mutex that only `wait` takes; `kill` goes
/// through the PID so it never queues behind a parked reaper.
pub struct ChildProcess {
    pid: u32,
    child: tokio::sync::Mutex<Child>,
    exited: AtomicBool,
}

impl ChildProcess {
    /// Spawn `command` and wrap the child. Must run inside a Tokio runtime.
    pub fn spawn(mut command: Command) -> Result<Self> {
        let child = command
            .spawn()
            .map_err(|e| TaskError::Spawn(format!("spawn failed: {e}")))?;
        let pid = child
            .id()
            .ok_or_else(|| TaskError::Spawn("child exited before a pid was assigned".to_string()))?;
        Ok(Self {
            pid,
            child: tokio::sync::Mutex::new(child),
            exited: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn kill(&self) -> Result<()> {
        if self.exited.load(Ordering::SeqCst) {
            debug!(pid = self.pid, "kill requested on an already reaped process");
            return Ok(());
        }
        settle_kill(self.pid, kill_pid(self.pid))
    }

    async fn wait(&self) -> Result<ExitInfo> {
        let mut child = self.child.lock().await;
        let status = child
            .wait()
            .await
            .map_err(|e| TaskError::Wait(e.to_string()))?;
        self.exited.store(true, Ordering::SeqCst);
        Ok(ExitInfo {
            code: status.code(),
        })
    }
}

/// Why a kill by pid did not go through.
#[derive(Debug, PartialEq, Eq)]
enum KillError {
    /// The process had already exited.
    Gone,
    Failed(String),
}

/// A process that exited before the kill landed counts as killed; the
/// reaper clears the slot either way.
fn settle_kill(pid: u32, outcome: std::result::Result<(), KillError>) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(KillError::Gone) => {
            debug!(pid, "process exited before the kill");
            Ok(())
        }
        Err(KillError::Failed(reason)) => Err(TaskError::Kill { pid, reason }),
    }
}

#[cfg(unix)]
fn kill_pid(pid: u32) -> std::result::Result<(), KillError> {
    // Safety: plain syscall on a pid we spawned.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Err(KillError::Gone)
    } else {
        Err(KillError::Failed(err.to_string()))
    }
}

#[cfg(windows)]
fn kill_pid(pid: u32) -> std::result::Result<(), KillError> {
    use windows::Win32::Foundation::{CloseHandle, ERROR_INVALID_PARAMETER, FALSE, STILL_ACTIVE};
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        PROCESS_TERMINATE,
    };

    // Safety: the handle is closed before returning.
    unsafe {
        let handle = match OpenProcess(
            PROCESS_TERMINATE | PROCESS_QUERY_LIMITED_INFORMATION,
            FALSE,
            pid,
        ) {
            Ok(h) => h,
            Err(e) if e.code() == ERROR_INVALID_PARAMETER.to_hresult() => {
                return Err(KillError::Gone)
            }
            Err(e) => return Err(KillError::Failed(e.to_string())),
        };

        let outcome = match TerminateProcess(handle, 1) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Terminating an exited process that still has open handles
                // fails with access denied.
                let mut code = 0u32;
                if GetExitCodeProcess(handle, &mut code).is_ok()
                    && code != STILL_ACTIVE.0 as u32
                {
                    Err(KillError::Gone)
                } else {
                    Err(KillError::Failed(e.to_string()))
                }
            }
        };
        let _ = CloseHandle(handle);
        outcome
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_pid(_pid: u32) -> std::result::Result<(), KillError> {
    Err(KillError::Failed("killing by pid is not supported on this platform".to_string()))
}
