//! bealink-tasks: external script processes for the Bealink agent.
//!
//! Two ways of running AutoHotkey:
//! - `AhkLauncher`: spawn a script file and keep its handle (countdown tasks)
//! - `StdinAhkRunner`: pipe a short snippet through stdin and wait for it
//!
//! `TaskTracker` owns at most one live process per named slot and gives the
//! HTTP layer toggle semantics: a request on an idle slot starts the task, a
//! request on a busy slot kills it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bealink_tasks::{AhkLauncher, TaskTracker, SLEEP_TASK};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracker = TaskTracker::new(Arc::new(AhkLauncher::new("C:/bealink/ahk")));
//!     let outcome = tracker.request(&SLEEP_TASK, &[]).unwrap();
//!     println!("{outcome}");
//! }
//! ```

pub mod ahk;
pub mod error;
pub mod process;
pub mod tracker;
pub mod types;

pub use ahk::{AhkLauncher, AhkRunner, StdinAhkRunner};
pub use error::{Result, TaskError};
pub use process::{ChildProcess, ProcessHandle, ProcessLauncher};
pub use tracker::TaskTracker;
pub use types::{ExitInfo, TaskOutcome, TaskSpec, SHUTDOWN_TASK, SLEEP_TASK};
