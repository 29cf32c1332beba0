//! Shared data types for bealink-tasks.

use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// TaskSpec
// ---------------------------------------------------------------------------

/// A named task slot and the script it launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Slot key, e.g. `"sleep"`.
    pub name: &'static str,
    /// Script file name under `<ahk dir>/script/`.
    pub script: &'static str,
}

/// Countdown that puts the machine to sleep.
pub const SLEEP_TASK: TaskSpec = TaskSpec {
    name: "sleep",
    script: "sleep_countdown.ahk",
};

/// Countdown that shuts the machine down.
pub const SHUTDOWN_TASK: TaskSpec = TaskSpec {
    name: "shutdown",
    script: "shutdown_countdown.ahk",
};

// ---------------------------------------------------------------------------
// TaskOutcome
// ---------------------------------------------------------------------------

/// Result of a toggle request on a task slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskOutcome {
    /// The slot was idle; a new process now owns it.
    Started { slot: String, pid: u32 },
    /// The slot held a live process; it was killed and the slot is idle.
    Cancelled { slot: String, pid: u32 },
}

impl TaskOutcome {
    pub fn slot(&self) -> &str {
        match self {
            Self::Started { slot, .. } | Self::Cancelled { slot, .. } => slot,
        }
    }

    pub fn pid(&self) -> u32 {
        match self {
            Self::Started { pid, .. } | Self::Cancelled { pid, .. } => *pid,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { slot, pid } => write!(f, "{slot} started (pid {pid})"),
            Self::Cancelled { slot, pid } => write!(f, "{slot} cancelled (pid {pid})"),
        }
    }
}

// ---------------------------------------------------------------------------
// ExitInfo
// ---------------------------------------------------------------------------

/// How a tracked process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}
