//! Sliding-window admission control, one instance per data source.

use crate::config::{RateLimitsConfig, RatePolicy};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Allows at most `calls` admissions in any trailing `window`.
///
/// `admit` never fails; it delays the caller until the oldest recorded call
/// leaves the window. The lock is held across the wait, so concurrent callers
/// of the same source are admitted one after another in lock order.
pub struct RateLimiter {
    name: &'static str,
    calls: usize,
    window: Duration,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, calls: usize, window: Duration) -> Self {
        Self {
            name,
            calls: calls.max(1),
            window,
            history: Mutex::new(VecDeque::with_capacity(calls.max(1))),
        }
    }

    pub fn from_policy(name: &'static str, policy: RatePolicy) -> Self {
        Self::new(name, policy.calls, policy.window())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn admit(&self) {
        let mut history = self.history.lock().await;

        let now = Instant::now();
        while let Some(&oldest) = history.front() {
            if now.duration_since(oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() >= self.calls {
            if let Some(&oldest) = history.front() {
                let ready_at = oldest + self.window;
                log::info!(
                    "{} rate limit reached: waiting {:.2}s",
                    self.name,
                    ready_at.saturating_duration_since(now).as_secs_f64()
                );
                sleep_until(ready_at).await;
            }
            history.pop_front();
        }

        history.push_back(Instant::now());
    }

    /// Calls recorded inside the current window.
    pub async fn in_window(&self) -> usize {
        let history = self.history.lock().await;
        let now = Instant::now();
        history
            .iter()
            .filter(|&&at| now.duration_since(at) < self.window)
            .count()
    }
}

/// The per-source limiters owned by one worker process.
#[derive(Clone)]
pub struct RateLimiters {
    pub majestic: Arc<RateLimiter>,
    pub ahrefs: Arc<RateLimiter>,
    pub dataforseo: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitsConfig) -> Self {
        Self {
            majestic: Arc::new(RateLimiter::from_policy("Majestic", config.majestic)),
            ahrefs: Arc::new(RateLimiter::from_policy("Ahrefs", config.ahrefs)),
            dataforseo: Arc::new(RateLimiter::from_policy("DataForSEO", config.dataforseo)),
        }
    }
}
