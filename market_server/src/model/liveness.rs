//! Keep-alive tracker for feed subscribers.
//!
//! Records the last time each subscriber showed any inbound activity (a `PONG`
//! or any other line) and reports the ones that stayed silent longer than the
//! read deadline.
//!
//! - `LivenessMonitor::touch(id)`: record fresh activity for a subscriber.
//! - `LivenessMonitor::check_timeouts_at(now)`: remove and return every
//!   subscriber whose last activity is older than the timeout.
//! - `LivenessMonitor::forget(id)`: stop tracking a subscriber that left.
//!
//! Time is measured with `std::time::Instant`, which is monotonic. The monitor
//! itself is not synchronized; the hub keeps it under its own lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Identifier the hub assigns to each subscriber.
pub type SubscriberId = u64;

/// Tracks subscriber activity and determines inactivity based on a timeout.
pub struct LivenessMonitor {
    last_seen: HashMap<SubscriberId, Instant>,
    timeout: Duration,
}

impl LivenessMonitor {
    /// Create a monitor that expires subscribers silent for longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            timeout,
        }
    }

    /// Record activity for `id` now.
    pub fn touch(&mut self, id: SubscriberId) {
        self.touch_at(id, Instant::now());
    }

    /// Record activity for `id` at `at`.
    pub fn touch_at(&mut self, id: SubscriberId, at: Instant) {
        self.last_seen
            .entry(id)
            .and_modify(|seen| *seen = (*seen).max(at))
            .or_insert(at);
    }

    /// Stop tracking `id`. Returns whether it was tracked.
    pub fn forget(&mut self, id: SubscriberId) -> bool {
        self.last_seen.remove(&id).is_some()
    }

    /// Remove and return every subscriber silent for longer than the timeout.
    pub fn check_timeouts_at(&mut self, now: Instant) -> Vec<SubscriberId> {
        let timeout = self.timeout;
        let mut timed_out = Vec::new();
        self.last_seen.retain(|id, seen| {
            if now.saturating_duration_since(*seen) > timeout {
                timed_out.push(*id);
                false
            } else {
                true
            }
        });
        timed_out
    }

    /// Whether `id` is currently tracked.
    pub fn is_tracked(&self, id: SubscriberId) -> bool {
        self.last_seen.contains_key(&id)
    }
}
