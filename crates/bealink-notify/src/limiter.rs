use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::events::TEST_EVENT;

/// Minimum spacing between two triggers of the same event type.
pub const COOLDOWN: Duration = Duration::from_secs(2);

/// Last-trigger time per event type.
///
/// Check and mark happen under one lock, so two simultaneous triggers of the
/// same type cannot both pass. The mark is taken before delivery; a send
/// that later fails still uses up the window.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(COOLDOWN)
    }
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Returns false if `event` fired less than the window ago. `test` is
    /// never refused but is still recorded.
    pub fn try_acquire(&self, event: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        if event != TEST_EVENT {
            if let Some(prev) = last.get(event) {
                if now.duration_since(*prev) < self.window {
                    return false;
                }
            }
        }
        last.insert(event.to_string(), now);
        true
    }
}
