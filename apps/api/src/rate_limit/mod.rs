//! Sliding-window rate limiter keyed by client identity.
//!
//! One instance is built in `main`, shared through `AppState`, and dropped on
//! shutdown. State is in memory only; a restart forgets every window.

pub mod middleware;

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a single admission check, with the numbers the response headers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self, identity: &str) -> bool {
        self.check(identity).allowed
    }

    /// Prunes expired timestamps for `identity`, then records the request if
    /// there is room. A rejected request is not recorded.
    pub fn check(&self, identity: &str) -> RateDecision {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);

        let timestamps = requests.entry(identity.to_string()).or_default();
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let allowed = timestamps.len() < self.max_requests;
        if allowed {
            timestamps.push_back(now);
        }

        RateDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(timestamps.len()),
        }
    }

    /// Drops identities with no request inside the current window. Returns how many were dropped.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let before = requests.len();
        requests.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|&newest| now.duration_since(newest) < self.window)
        });
        before - requests.len()
    }

    pub fn tracked_identities(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
