use crate::config::{RetentionConfig, WorkerConfig};
use crate::enricher::EnricherFactory;
use crate::error::Result;
use crate::job::{JobDescriptor, JobQueue, JobState, Recovery};
use crate::metrics::{self, MetricsCollector};
use crate::output::Exporter;
use crate::processor::{JobOutcome, JobProcessor};
use crate::retry::RetryPolicy;
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};

const SHUTDOWN_REASON: &str = "worker shut down while job was processing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    Idle,
    Processed(JobOutcome),
    Interrupted,
}

/// Top-level loop: claim one job, run it to the end, clean up, sleep.
pub struct QueueWatcher {
    queue: Arc<dyn JobQueue>,
    processor: JobProcessor,
    metrics: MetricsCollector,
    retention: RetentionConfig,
    poll_interval: Duration,
    error_backoff: Duration,
    heartbeat_interval: Duration,
}

impl QueueWatcher {
    pub fn new(
        config: &WorkerConfig,
        queue: Arc<dyn JobQueue>,
        factory: Arc<dyn EnricherFactory>,
        metrics: MetricsCollector,
    ) -> Self {
        let exporter = Exporter::new(config.export.format, RetryPolicy::from_config(&config.export));
        Self {
            processor: JobProcessor::new(queue.clone(), factory, exporter, metrics.clone()),
            queue,
            metrics,
            retention: config.retention.clone(),
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }

    pub fn processor(&self) -> &JobProcessor {
        &self.processor
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Drops orphaned statuses and fails jobs a previous worker left in `processing`.
    pub async fn recover(&self) -> Result<Recovery> {
        let recovery = self.queue.recover_orphans().await?;
        for _ in &recovery.interrupted {
            self.metrics.increment_jobs_failed();
        }
        if recovery.orphans_removed > 0 || !recovery.interrupted.is_empty() {
            log::info!(
                "Startup recovery: removed {} orphaned statuses, failed {} interrupted jobs",
                recovery.orphans_removed,
                recovery.interrupted.len()
            );
        }
        Ok(recovery)
    }

    /// One loop iteration without a stop signal.
    pub async fn run_once(&self) -> Result<Iteration> {
        self.iterate(pin!(std::future::pending::<()>())).await
    }

    /// Runs until `shutdown` resolves. A job still running at that point is
    /// marked `error` with its last progress.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.recover().await?;
        let heartbeat = self.spawn_heartbeat();
        let mut shutdown = pin!(shutdown);
        log::info!("Watching for jobs every {:?}", self.poll_interval);

        let result = loop {
            let pause = match self.iterate(shutdown.as_mut()).await {
                Ok(Iteration::Interrupted) => break Ok(()),
                Ok(_) => self.poll_interval,
                Err(e) => {
                    log::error!("Error in main loop: {}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.as_mut() => break Ok(()),
            }
        };

        heartbeat.abort();
        log::info!("Worker stopped");
        result
    }

    async fn iterate<F>(&self, mut shutdown: Pin<&mut F>) -> Result<Iteration>
    where
        F: Future<Output = ()>,
    {
        let claim = self.queue.claim_next().await?;
        self.metrics.add_quarantined(claim.quarantined);

        let iteration = match claim.job {
            Some(job) => {
                self.metrics.increment_jobs_claimed();
                tokio::select! {
                    outcome = self.processor.process(&job) => Iteration::Processed(outcome?),
                    _ = shutdown.as_mut() => {
                        self.interrupt(&job).await?;
                        return Ok(Iteration::Interrupted);
                    }
                }
            }
            None => Iteration::Idle,
        };

        let purged = self.queue.purge_expired(SystemTime::now(), &self.retention).await?;
        self.metrics.add_purged(purged);
        Ok(iteration)
    }

    async fn interrupt(&self, job: &JobDescriptor) -> Result<()> {
        let processed = self
            .processor
            .subscribe()
            .borrow()
            .as_ref()
            .filter(|progress| progress.job_id == job.id)
            .map_or(0, |progress| progress.processed);
        log::warn!("Stopping with job {} at {}/{} URLs", job.id, processed, job.total());
        self.metrics.increment_jobs_failed();
        self.queue
            .mark_terminal(&job.id, JobState::failed(SHUTDOWN_REASON, processed, job.total()))
            .await
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let every = self.heartbeat_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log_heartbeat(&metrics);
            }
        })
    }
}

fn log_heartbeat(collector: &MetricsCollector) {
    let memory = metrics::resident_memory_mb()
        .map_or_else(|| "unknown".to_string(), |mb| format!("{:.1} MB", mb));
    let snapshot = serde_json::to_string(&collector.snapshot()).unwrap_or_default();
    log::info!("Worker heartbeat - memory: {}, metrics: {}", memory, snapshot);
}
