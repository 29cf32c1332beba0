//! `TaskTracker`: one cancellable external process per named slot.
//!
//! Per-slot state machine:
//!
//! ```text
//! Idle --request--> Starting --spawned--> Running --request (kill)--> Idle
//!                       |                    |
//!                       +--spawn failed--> Idle <--reaper saw exit--+
//! ```
//!
//! Every read or write of a slot happens under that slot's mutex. Spawning
//! and waiting for exit happen outside it, so a cancel never queues behind a
//! slow spawn or a parked reaper. Each install gets a fresh generation
//! number; a reaper only clears the slot when the generation it waited on is
//! still the installed one.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, TaskError},
    process::{ProcessHandle, ProcessLauncher},
    types::{TaskOutcome, TaskSpec},
};

enum SlotState {
    Idle,
    /// Spawn in flight; the slot is claimed but holds no handle yet.
    Starting,
    Running {
        generation: u64,
        handle: Arc<dyn ProcessHandle>,
    },
}

struct TaskSlot {
    name: String,
    state: Mutex<SlotState>,
}

impl TaskSlot {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(SlotState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns every task slot for the lifetime of the agent.
pub struct TaskTracker {
    launcher: Arc<dyn ProcessLauncher>,
    slots: DashMap<String, Arc<TaskSlot>>,
    generation: std::sync::atomic::AtomicU64,
}

impl TaskTracker {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            slots: DashMap::new(),
            generation: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Toggle the slot named by `spec`.
    ///
    /// Idle slot: launch `spec.script` with `args`, install the handle and
    /// start a reaper. Running slot: kill the process and clear the slot.
    ///
    /// Must be called from inside a Tokio runtime (the reaper is a spawned
    /// task).
    ///
    /// # Errors
    ///
    /// - `Kill`: the OS refused the kill; the handle stays installed.
    /// - `SlotBusy`: another request is between spawn and install.
    /// - any launcher error: nothing changed.
    pub fn request(&self, spec: &TaskSpec, args: &[String]) -> Result<TaskOutcome> {
        let slot = self.slot(spec.name);

        // Phase 1: decide under the lock.
        {
            let mut state = slot.lock();
            let running = match &*state {
                SlotState::Running { handle, .. } => Some(Arc::clone(handle)),
                SlotState::Starting => return Err(TaskError::SlotBusy(slot.name.clone())),
                SlotState::Idle => None,
            };

            if let Some(handle) = running {
                let pid = handle.pid();
                info!(slot = %slot.name, pid, "cancelling task");
                if let Err(e) = handle.kill() {
                    warn!(slot = %slot.name, pid, error = %e, "kill failed, keeping handle");
                    return Err(e);
                }
                *state = SlotState::Idle;
                return Ok(TaskOutcome::Cancelled {
                    slot: slot.name.clone(),
                    pid,
                });
            }

            *state = SlotState::Starting;
        }

        // Phase 2: spawn outside the lock.
        let handle = match self.launcher.launch(spec.script, args) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(slot = %slot.name, script = spec.script, error = %e, "task launch failed");
                *slot.lock() = SlotState::Idle;
                return Err(e);
            }
        };

        // Phase 3: install under the lock.
        let pid = handle.pid();
        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        *slot.lock() = SlotState::Running {
            generation,
            handle: Arc::clone(&handle),
        };
        info!(slot = %slot.name, pid, generation, "task started");

        spawn_reaper(Arc::clone(&slot), generation, handle);

        Ok(TaskOutcome::Started {
            slot: slot.name.clone(),
            pid,
        })
    }

    /// PID of the live process in `name`, if any.
    pub fn current_pid(&self, name: &str) -> Option<u32> {
        let slot = self.slots.get(name)?;
        let state = slot.lock();
        match &*state {
            SlotState::Running { handle, .. } => Some(handle.pid()),
            _ => None,
        }
    }

    /// `(slot, pid)` for every slot that has ever been used.
    pub fn snapshot(&self) -> Vec<(String, Option<u32>)> {
        let mut out: Vec<_> = self
            .slots
            .iter()
            .map(|entry| {
                let pid = match &*entry.value().lock() {
                    SlotState::Running { handle, .. } => Some(handle.pid()),
                    _ => None,
                };
                (entry.key().clone(), pid)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn slot(&self, name: &str) -> Arc<TaskSlot> {
        self.slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TaskSlot::new(name)))
            .clone()
    }
}

/// Wait for `handle` to exit, then clear the slot if it still holds the
/// same generation.
fn spawn_reaper(slot: Arc<TaskSlot>, generation: u64, handle: Arc<dyn ProcessHandle>) {
    tokio::spawn(async move {
        let pid = handle.pid();
        debug!(slot = %slot.name, pid, "reaper waiting for exit");

        match handle.wait().await {
            Ok(exit) => info!(slot = %slot.name, pid, %exit, "task process ended"),
            Err(e) => warn!(slot = %slot.name, pid, error = %e, "waiting for task process failed"),
        }

        let mut state = slot.lock();
        let still_installed = matches!(
            &*state,
            SlotState::Running { generation: current, .. } if *current == generation
        );
        if still_installed {
            *state = SlotState::Idle;
            info!(slot = %slot.name, pid, "cleared finished task");
        } else {
            debug!(slot = %slot.name, pid, "slot already moved on, reaper leaves it alone");
        }
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
