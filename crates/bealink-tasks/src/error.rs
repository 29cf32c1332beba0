//! Error types for the bealink-tasks crate.

use thiserror::Error;

/// All errors that can originate from launching, killing or reaping tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The script file is not where the launcher expects it.
    #[error("Script {script} not found at {path}")]
    ScriptNotFound { script: String, path: String },

    /// Child-process spawn failed.
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// The OS refused to terminate the process. The handle stays installed.
    #[error("Failed to kill process {pid}: {reason}")]
    Kill { pid: u32, reason: String },

    /// Waiting for process exit failed.
    #[error("Wait error: {0}")]
    Wait(String),

    /// Another request for the same slot is between spawn and install.
    #[error("Task slot {0} is busy starting a process")]
    SlotBusy(String),

    /// An AHK snippet ran but reported failure.
    #[error("AutoHotkey failed: {0}")]
    AhkFailed(String),

    /// Operation exceeded its time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Underlying I/O failure (pipe write, read).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TaskError>;
