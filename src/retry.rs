//! Bounded retry for local file writes. Never used for network calls.

use crate::config::ExportConfig;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(
            config.write_attempts,
            Duration::from_millis(config.write_backoff_ms),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Runs `op` until it succeeds or `policy.attempts` tries have failed,
/// sleeping a fixed backoff between tries. The last error is returned.
pub async fn retry_io<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                log::warn!(
                    "OS write error on {}, attempt {} of {}: {}",
                    what,
                    attempt,
                    attempts,
                    e
                );
                sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
