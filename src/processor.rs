use crate::enricher::{EnricherFactory, UrlEnricher};
use crate::error::Result;
use crate::job::{Boundary, JobDescriptor, JobQueue, JobState, Progress, Summary};
use crate::metrics::MetricsCollector;
use crate::normalize::NormalizedUrl;
use crate::output::Exporter;
use crate::record::{ResultRecord, StatusCell};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(Summary),
    Cancelled { processed: usize },
    Failed(String),
}

/// Runs one claimed job: URLs strictly in order, progress after each one,
/// then export and a terminal status.
pub struct JobProcessor {
    queue: Arc<dyn JobQueue>,
    factory: Arc<dyn EnricherFactory>,
    exporter: Exporter,
    metrics: MetricsCollector,
    progress: watch::Sender<Option<Progress>>,
}

impl JobProcessor {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        factory: Arc<dyn EnricherFactory>,
        exporter: Exporter,
        metrics: MetricsCollector,
    ) -> Self {
        let (progress, _) = watch::channel(None);
        Self {
            queue,
            factory,
            exporter,
            metrics,
            progress,
        }
    }

    /// Latest progress snapshot of whichever job is running.
    pub fn subscribe(&self) -> watch::Receiver<Option<Progress>> {
        self.progress.subscribe()
    }

    /// Failures inside the job become an `error` status; only a failure to
    /// write that terminal status is returned.
    pub async fn process(&self, job: &JobDescriptor) -> Result<JobOutcome> {
        let started = Instant::now();
        log::info!("Starting job {} with {} URLs", job.id, job.total());

        let mut progress = Progress::new(job.id.clone(), job.total());
        let outcome = match self.execute(job, &mut progress, started).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Job {} failed: {}", job.id, e);
                JobOutcome::Failed(e.to_string())
            }
        };

        let state = match &outcome {
            JobOutcome::Completed(summary) => summary.completed(&job.id, job.total(), started.elapsed()),
            JobOutcome::Cancelled { .. } => progress.cancelled(),
            JobOutcome::Failed(reason) => JobState::failed(reason.clone(), progress.processed, progress.total),
        };
        self.queue.mark_terminal(&job.id, state).await?;

        match &outcome {
            JobOutcome::Completed(summary) => {
                self.metrics.increment_jobs_completed();
                log::info!(
                    "Job {} completed in {:.1}s: {} successful, {} errors",
                    job.id,
                    started.elapsed().as_secs_f64(),
                    summary.successful,
                    summary.errors
                );
            }
            JobOutcome::Cancelled { processed } => {
                self.metrics.increment_jobs_cancelled();
                log::info!("Job {} cancelled after {} of {} URLs", job.id, processed, job.total());
            }
            JobOutcome::Failed(_) => self.metrics.increment_jobs_failed(),
        }
        Ok(outcome)
    }

    async fn execute(&self, job: &JobDescriptor, progress: &mut Progress, started: Instant) -> Result<JobOutcome> {
        let enricher = Arc::new(self.factory.connect()?);
        let mut records = Vec::with_capacity(job.total());

        for (index, raw) in job.urls.iter().enumerate() {
            if index > 0 && self.queue.cancel_requested(&job.id).await? {
                return Ok(JobOutcome::Cancelled {
                    processed: progress.processed,
                });
            }

            let record = self.enrich_isolated(&enricher, job, raw).await;
            self.metrics.record_url(record.status);
            records.push(record);

            progress.processed += 1;
            progress.elapsed = started.elapsed();
            self.progress.send_replace(Some(progress.clone()));
            log_progress(progress);

            if self.queue.record_progress(progress).await? == Boundary::CancelRequested {
                return Ok(JobOutcome::Cancelled {
                    processed: progress.processed,
                });
            }
        }

        let path = self.queue.artifact_path(&job.id);
        self.exporter.export(&records, &job.providers, &path).await?;
        Ok(JobOutcome::Completed(Summary::tally(&records)))
    }

    /// Runs one URL on its own task so a panic in an adapter costs only that row.
    async fn enrich_isolated(&self, enricher: &Arc<UrlEnricher>, job: &JobDescriptor, raw: &str) -> ResultRecord {
        let task = {
            let enricher = enricher.clone();
            let providers = job.providers.clone();
            let url = raw.to_string();
            tokio::spawn(async move { enricher.enrich(&url, &providers).await })
        };

        match task.await {
            Ok(record) => record,
            Err(e) => {
                log::error!("Error processing URL {}: {}", raw, e);
                ResultRecord::degraded(NormalizedUrl::parse(raw), StatusCell::Error, &job.providers)
            }
        }
    }
}

fn log_progress(progress: &Progress) {
    if progress.processed % 10 != 0 && progress.processed != progress.total {
        return;
    }
    let percent = progress.processed as f64 * 100.0 / progress.total.max(1) as f64;
    let average = progress.elapsed.as_secs_f64() / progress.processed as f64;
    log::info!(
        "Job {}: {}/{} URLs ({:.1}%), avg {:.2}s per URL, about {:.1} min remaining",
        progress.job_id,
        progress.processed,
        progress.total,
        percent,
        average,
        progress.remaining().as_secs_f64() / 60.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::job::{DirQueue, JobId};
    use crate::output::ReportFormat;
    use crate::record::{Provider, Reachability};
    use crate::retry::RetryPolicy;
    use crate::sources::{Probe, SourceAdapter, SourceOutcome};
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::time::Duration;
    use tempfile::TempDir;

    struct OkProbe;

    #[async_trait]
    impl Probe for OkProbe {
        async fn status(&self, _url: &NormalizedUrl) -> StatusCell {
            StatusCell::Code(200)
        }

        async fn https(&self, _url: &NormalizedUrl) -> Reachability {
            Reachability::Yes
        }
    }

    struct PanicsOn(&'static str);

    #[async_trait]
    impl SourceAdapter for PanicsOn {
        fn provider(&self) -> Provider {
            Provider::Majestic
        }

        async fn fetch(&self, url: &NormalizedUrl, _credential: Option<&SecretString>) -> SourceOutcome {
            if url.host() == self.0 {
                panic!("adapter bug");
            }
            SourceOutcome::Degraded("no data".into())
        }
    }

    struct Factory(bool);

    impl EnricherFactory for Factory {
        fn connect(&self) -> Result<UrlEnricher> {
            if !self.0 {
                return Err(Error::Internal("connection pool unavailable".into()));
            }
            let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(PanicsOn("boom.example"))];
            Ok(UrlEnricher::new(Arc::new(OkProbe), adapters, Duration::from_secs(5)))
        }
    }

    async fn claimed(dir: &TempDir, urls: &str) -> (Arc<DirQueue>, JobDescriptor) {
        let queue = Arc::new(DirQueue::new(
            dir.path().join("jobs"),
            dir.path().join("results"),
            ReportFormat::Csv,
        ));
        queue.ensure_dirs().await.unwrap();
        let body = format!(r#"{{"urls": {}, "use_majestic": true, "majestic_api_key": "k"}}"#, urls);
        tokio::fs::write(dir.path().join("jobs/job.json"), body).await.unwrap();
        let job = queue.claim_next().await.unwrap().job.unwrap();
        (queue, job)
    }

    fn processor(queue: Arc<DirQueue>, connects: bool) -> JobProcessor {
        JobProcessor::new(
            queue,
            Arc::new(Factory(connects)),
            Exporter::new(ReportFormat::Csv, RetryPolicy::default()),
            MetricsCollector::new(),
        )
    }

    #[tokio::test]
    async fn panicking_adapter_costs_one_row() {
        let dir = TempDir::new().unwrap();
        let (queue, job) = claimed(&dir, r#"["boom.example", "fine.example"]"#).await;
        let processor = processor(queue.clone(), true);
        let progress = processor.subscribe();

        let outcome = processor.process(&job).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Completed(Summary {
                successful: 1,
                errors: 1
            })
        );

        let report = std::fs::read_to_string(queue.artifact_path(&job.id)).unwrap();
        let rows: Vec<&str> = report.lines().collect();
        assert_eq!(rows[1], "http://boom.example,Error,N/A,N/A");
        assert_eq!(rows[2], "http://fine.example,200,N/A,Yes");

        let last = progress.borrow().clone().unwrap();
        assert_eq!((last.processed, last.total), (2, 2));
        assert_eq!(processor.metrics.snapshot().urls_errored, 1);
    }

    #[tokio::test]
    async fn connect_failure_marks_job_error_without_artifact() {
        let dir = TempDir::new().unwrap();
        let (queue, job) = claimed(&dir, r#"["a.com"]"#).await;

        let outcome = processor(queue.clone(), false).process(&job).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed(ref reason) if reason.contains("connection pool")));

        let record = queue.read_status(&JobId::parse("job").unwrap()).await.unwrap().unwrap();
        assert!(matches!(record.state, JobState::Error { progress: 0, total: 1, .. }));
        assert!(!queue.artifact_path(&job.id).exists());
    }
}
