use crate::metrics::snapshot::MetricsSnapshot;
use crate::record::StatusCell;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Instant;

/// Process-wide worker counters, cheap to clone and share.
#[derive(Clone)]
pub struct MetricsCollector {
    jobs_claimed: Arc<AtomicU64>,
    jobs_completed: Arc<AtomicU64>,
    jobs_failed: Arc<AtomicU64>,
    jobs_cancelled: Arc<AtomicU64>,
    descriptors_quarantined: Arc<AtomicU64>,
    urls_processed: Arc<AtomicU64>,
    urls_timed_out: Arc<AtomicU64>,
    urls_errored: Arc<AtomicU64>,
    files_purged: Arc<AtomicU64>,
    start_time: Arc<Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            jobs_claimed: Arc::new(AtomicU64::new(0)),
            jobs_completed: Arc::new(AtomicU64::new(0)),
            jobs_failed: Arc::new(AtomicU64::new(0)),
            jobs_cancelled: Arc::new(AtomicU64::new(0)),
            descriptors_quarantined: Arc::new(AtomicU64::new(0)),
            urls_processed: Arc::new(AtomicU64::new(0)),
            urls_timed_out: Arc::new(AtomicU64::new(0)),
            urls_errored: Arc::new(AtomicU64::new(0)),
            files_purged: Arc::new(AtomicU64::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_jobs_claimed(&self) {
        self.jobs_claimed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_jobs_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_quarantined(&self, count: usize) {
        self.descriptors_quarantined
            .fetch_add(count as u64, Ordering::SeqCst);
    }

    pub fn add_purged(&self, count: usize) {
        self.files_purged.fetch_add(count as u64, Ordering::SeqCst);
    }

    pub fn record_url(&self, status: StatusCell) {
        self.urls_processed.fetch_add(1, Ordering::SeqCst);
        match status {
            StatusCell::Timeout => {
                self.urls_timed_out.fetch_add(1, Ordering::SeqCst);
            }
            StatusCell::Error => {
                self.urls_errored.fetch_add(1, Ordering::SeqCst);
            }
            StatusCell::Code(_) | StatusCell::NotAvailable => {}
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let urls_processed = self.urls_processed.load(Ordering::SeqCst);
        let uptime = self.start_time.elapsed().as_secs_f64();

        MetricsSnapshot {
            jobs_claimed: self.jobs_claimed.load(Ordering::SeqCst),
            jobs_completed: self.jobs_completed.load(Ordering::SeqCst),
            jobs_failed: self.jobs_failed.load(Ordering::SeqCst),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::SeqCst),
            descriptors_quarantined: self.descriptors_quarantined.load(Ordering::SeqCst),
            urls_processed,
            urls_timed_out: self.urls_timed_out.load(Ordering::SeqCst),
            urls_errored: self.urls_errored.load(Ordering::SeqCst),
            files_purged: self.files_purged.load(Ordering::SeqCst),
            urls_per_second: if uptime > 0.0 {
                urls_processed as f64 / uptime
            } else {
                0.0
            },
            uptime_seconds: uptime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_outcomes_are_split_by_status() {
        let metrics = MetricsCollector::new();
        let shared = metrics.clone();
        shared.record_url(StatusCell::Code(200));
        shared.record_url(StatusCell::Timeout);
        shared.record_url(StatusCell::Error);
        shared.record_url(StatusCell::NotAvailable);
        metrics.add_quarantined(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.urls_processed, 4);
        assert_eq!(snapshot.urls_timed_out, 1);
        assert_eq!(snapshot.urls_errored, 1);
        assert_eq!(snapshot.descriptors_quarantined, 2);
        assert_eq!(snapshot.jobs_claimed, 0);
    }
}
