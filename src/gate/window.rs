//! Sliding-window request log for a single caller

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Ordered request instants within the trailing window
#[derive(Debug, Clone)]
pub struct RateWindow {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

impl RateWindow {
    pub fn new(now: Instant) -> Self {
        Self {
            hits: VecDeque::new(),
            last_seen: now,
        }
    }

    /// Drop expired instants, append `now` and return the resulting count.
    ///
    /// An instant is expired once it is `window` or more older than `now`.
    /// At most `cap` of the newest instants are kept, so the returned count
    /// saturates at `cap`. With `cap = budget + 1` the over-budget check is
    /// unaffected while a flooding caller holds bounded memory.
    pub fn record(&mut self, now: Instant, window: Duration, cap: usize) -> usize {
        self.trim(now, window);
        self.hits.push_back(now);
        while self.hits.len() > cap.max(1) {
            self.hits.pop_front();
        }
        self.last_seen = now;
        self.hits.len()
    }

    fn trim(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.hits.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Time since the last recorded request
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}
