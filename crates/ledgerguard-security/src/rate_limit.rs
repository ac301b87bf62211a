// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sliding-window rate limiter.
//
// Advisory and client-side only: each key keeps the timestamps of its
// accepted calls inside the trailing window. Nothing persists across
// restarts and nothing is shared between processes.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ledgerguard_core::config::RateLimitConfig;
use tracing::{debug, warn};

use crate::locks::lock;

/// Per-key sliding-window throttle.
#[derive(Debug)]
pub struct RateLimiter {
    /// Accepted-call timestamps keyed by caller-chosen key.
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    window: Duration,
    default_max: usize,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: config.window(),
            default_max: config.default_max_per_minute,
        }
    }

    /// Check `key` against the default budget.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_with_limit(key, self.default_max)
    }

    /// Check `key` against `max_per_minute` accepted calls per window.
    pub fn allow_with_limit(&self, key: &str, max_per_minute: usize) -> bool {
        self.allow_at(key, max_per_minute, Instant::now())
    }

    /// Same as [`RateLimiter::allow_with_limit`] with an explicit clock.
    ///
    /// Rejected calls are not recorded, so hammering a throttled key does not
    /// push its recovery further out.
    pub fn allow_at(&self, key: &str, max_per_minute: usize, now: Instant) -> bool {
        let mut windows = lock(&self.windows);

        // Keys whose window has emptied are dropped, so the map only holds
        // keys with a call inside the trailing window.
        windows.retain(|_, window| {
            window.retain(|t| now.saturating_duration_since(*t) < self.window);
            !window.is_empty()
        });

        let used = windows.get(key).map_or(0, VecDeque::len);
        if used >= max_per_minute {
            warn!(key, max_per_minute, "rate limit exceeded");
            return false;
        }

        windows.entry(key.to_owned()).or_default().push_back(now);
        debug!(key, used = used + 1, max_per_minute, "call allowed");
        true
    }

    /// Calls still available to `key` at `now` under `max_per_minute`.
    pub fn remaining_at(&self, key: &str, max_per_minute: usize, now: Instant) -> usize {
        let windows = lock(&self.windows);
        let used = windows.get(key).map_or(0, |w| {
            w.iter()
                .filter(|t| now.saturating_duration_since(**t) < self.window)
                .count()
        });
        max_per_minute.saturating_sub(used)
    }

    /// Forget every window.
    pub fn reset(&self) {
        lock(&self.windows).clear();
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        lock(&self.windows).len()
    }
}
