//! Fixed-window request limiter keyed by caller.

use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::RateLimitSettings;

const WINDOW: Duration = Duration::from_secs(60);

struct Window {
    started: Instant,
    count: u32,
}

/// Allows `limit` requests per key per minute. A limit of 0 allows everything.
pub struct RateLimiter {
    limit: u32,
    windows: DashMap<String, Window>,
    next_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            windows: DashMap::new(),
            next_sweep: Mutex::new(Instant::now() + WINDOW),
        }
    }

    /// Counts one request for `key` and reports whether it is within budget.
    pub fn check(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }
        let now = Instant::now();
        self.sweep_if_due(now);

        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.limit {
            return false;
        }
        window.count += 1;
        true
    }

    fn sweep_if_due(&self, now: Instant) {
        let Ok(mut next) = self.next_sweep.try_lock() else {
            return;
        };
        if now < *next {
            return;
        }
        *next = now + WINDOW;
        drop(next);
        self.windows
            .retain(|_, window| now.duration_since(window.started) < WINDOW);
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// The service-wide limiter and the stricter one in front of model calls.
pub struct RateLimits {
    pub global: RateLimiter,
    pub ai: RateLimiter,
}

impl RateLimits {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            global: RateLimiter::per_minute(settings.requests_per_minute),
            ai: RateLimiter::per_minute(settings.ai_requests_per_minute),
        }
    }
}
