use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub descriptors_quarantined: u64,
    pub urls_processed: u64,
    pub urls_timed_out: u64,
    pub urls_errored: u64,
    pub files_purged: u64,
    pub urls_per_second: f64,
    pub uptime_seconds: f64,
}
