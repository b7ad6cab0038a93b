use super::{JobDescriptor, JobId, JobRequest, JobState, Progress, StatusRecord};
use crate::config::{RetentionConfig, WorkerConfig};
use crate::error::{Error, Result};
use crate::output::ReportFormat;
use crate::retry::{RetryPolicy, retry_io};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

const DESCRIPTOR_EXT: &str = ".json";
const STATUS_EXT: &str = ".status";
const QUARANTINE_EXT: &str = ".json.error";
const STAGING_EXT: &str = ".tmp";
const CANCEL_EXT: &str = ".cancel";

/// What the processor should do after persisting progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Continue,
    CancelRequested,
}

#[derive(Debug, Default)]
pub struct Claim {
    pub job: Option<JobDescriptor>,
    pub quarantined: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    pub orphans_removed: usize,
    pub interrupted: Vec<JobId>,
}

/// Durable job queue shared by the front end and the worker.
///
/// `claim_next` must be atomic: two workers never both own one job.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, request: &JobRequest) -> Result<JobId>;

    /// Claims the oldest unclaimed job, quarantining malformed ones on the way.
    async fn claim_next(&self) -> Result<Claim>;

    /// Whether the front end asked to cancel this job.
    async fn cancel_requested(&self, id: &JobId) -> Result<bool>;

    /// Persists a progress snapshot unless a cancellation is pending.
    async fn record_progress(&self, progress: &Progress) -> Result<Boundary>;

    async fn mark_terminal(&self, id: &JobId, state: JobState) -> Result<()>;

    fn artifact_path(&self, id: &JobId) -> PathBuf;

    async fn recover_orphans(&self) -> Result<Recovery>;

    /// Removes expired files and returns how many were deleted.
    async fn purge_expired(&self, now: SystemTime, retention: &RetentionConfig) -> Result<usize>;
}

/// Result of a front-end status lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum JobView {
    Queued,
    NotFound,
    Tracked(StatusRecord),
}

impl JobView {
    /// The JSON body the front end returns for this lookup.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Queued => json!({"status": "queued", "message": "Job is in the queue"}),
            Self::NotFound => json!({"status": "not_found", "message": "Job not found"}),
            Self::Tracked(record) => serde_json::to_value(record).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Dequeued,
    CancelRequested,
    AlreadyFinished,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: &'static str,
}

/// Directory-of-files queue: `<id>.json` descriptors and `<id>.status`
/// records in the job directory, artifacts in the results directory.
#[derive(Debug, Clone)]
pub struct DirQueue {
    jobs_dir: PathBuf,
    results_dir: PathBuf,
    format: ReportFormat,
    retry: RetryPolicy,
}

impl DirQueue {
    pub fn new(jobs_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            results_dir: results_dir.into(),
            format,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(&config.jobs_dir, &config.results_dir, config.export.format)
            .with_retry(RetryPolicy::from_config(&config.export))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.jobs_dir).await?;
        fs::create_dir_all(&self.results_dir).await?;
        Ok(())
    }

    fn descriptor_path(&self, id: &JobId) -> PathBuf {
        self.jobs_dir.join(format!("{}{}", id, DESCRIPTOR_EXT))
    }

    fn status_path(&self, id: &JobId) -> PathBuf {
        self.jobs_dir.join(format!("{}{}", id, STATUS_EXT))
    }

    fn quarantine_path(&self, id: &JobId) -> PathBuf {
        self.jobs_dir.join(format!("{}{}", id, QUARANTINE_EXT))
    }

    /// Written by `cancel` next to the status record. Progress writes replace
    /// the status file but never touch the marker.
    fn cancel_marker_path(&self, id: &JobId) -> PathBuf {
        self.jobs_dir.join(format!("{}{}", id, CANCEL_EXT))
    }

    pub async fn read_status(&self, id: &JobId) -> Result<Option<StatusRecord>> {
        match fs::read(self.status_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_status(&self, id: &JobId, state: JobState) -> Result<()> {
        let bytes = serde_json::to_vec(&StatusRecord::new(id, state))?;
        let path = self.status_path(id);
        let what = path.display().to_string();
        retry_io(self.retry, &what, || write_atomic(&path, &bytes)).await?;
        Ok(())
    }

    /// Unclaimed descriptors, oldest first by modification time, then by id.
    async fn pending(&self) -> Result<Vec<JobId>> {
        let mut pending = Vec::new();
        let mut entries = fs::read_dir(&self.jobs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_suffix(DESCRIPTOR_EXT))
                .and_then(|stem| JobId::parse(stem).ok())
            else {
                continue;
            };
            if fs::try_exists(self.status_path(&id)).await? {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            pending.push((modified, id));
        }
        pending.sort();
        Ok(pending.into_iter().map(|(_, id)| id).collect())
    }

    /// Publishes the initial `processing` record with a hard link, which
    /// fails if another claimant already created the status file.
    async fn try_claim(&self, job: &JobDescriptor) -> Result<bool> {
        let state = Progress::new(job.id.clone(), job.total()).to_state();
        let bytes = serde_json::to_vec(&StatusRecord::new(&job.id, state))?;
        let staging = self.jobs_dir.join(format!("{}.claim{}", job.id, STAGING_EXT));
        fs::write(&staging, &bytes).await?;

        let linked = fs::hard_link(&staging, self.status_path(&job.id)).await;
        let _ = fs::remove_file(&staging).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn quarantine(&self, id: &JobId) -> Result<()> {
        fs::rename(self.descriptor_path(id), self.quarantine_path(id)).await?;
        Ok(())
    }

    async fn remove_if_present(path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn purge_job(&self, id: &JobId) -> Result<usize> {
        let mut removed = 0;
        let mut paths = vec![
            self.descriptor_path(id),
            self.status_path(id),
            self.cancel_marker_path(id),
        ];
        paths.extend(
            ReportFormat::ALL
                .iter()
                .map(|format| self.results_dir.join(format.file_name(id.as_str()))),
        );
        for path in paths {
            if Self::remove_if_present(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn status(&self, raw_id: &str) -> Result<JobView> {
        let id = JobId::parse(raw_id)?;
        if let Some(record) = self.read_status(&id).await? {
            return Ok(JobView::Tracked(record));
        }
        if fs::try_exists(self.descriptor_path(&id)).await? {
            Ok(JobView::Queued)
        } else {
            Ok(JobView::NotFound)
        }
    }

    /// Dequeues a waiting job, or flips a running one to `cancelled` for the
    /// worker to observe at its next URL boundary.
    pub async fn cancel(&self, raw_id: &str) -> Result<CancelOutcome> {
        let id = JobId::parse(raw_id)?;
        match self.read_status(&id).await? {
            Some(StatusRecord {
                state: JobState::Processing {
                    progress,
                    total,
                    elapsed_seconds,
                    ..
                },
                ..
            }) => {
                let cancelled = JobState::Cancelled {
                    progress,
                    total,
                    elapsed_seconds: Some(elapsed_seconds),
                };
                fs::write(self.cancel_marker_path(&id), b"").await?;
                self.write_status(&id, cancelled).await?;
                Ok(CancelOutcome::CancelRequested)
            }
            Some(_) => Ok(CancelOutcome::AlreadyFinished),
            None => {
                if Self::remove_if_present(&self.descriptor_path(&id)).await? {
                    Ok(CancelOutcome::Dequeued)
                } else {
                    Ok(CancelOutcome::NotFound)
                }
            }
        }
    }

    pub async fn artifact(&self, raw_id: &str) -> Result<Artifact> {
        let id = JobId::parse(raw_id)?;
        match self.read_status(&id).await? {
            Some(StatusRecord {
                state: JobState::Completed { .. },
                ..
            }) => {}
            Some(record) => {
                return Err(Error::NotReady(format!(
                    "job {} is {}",
                    id,
                    record.state.name()
                )));
            }
            None => return Err(Error::JobNotFound(id.to_string())),
        }

        let path = self.artifact_path(&id);
        if !fs::try_exists(&path).await? {
            return Err(Error::JobNotFound(format!("result file for job {}", id)));
        }
        Ok(Artifact {
            path,
            file_name: self.format.file_name(id.as_str()),
            content_type: self.format.content_type(),
        })
    }
}

#[async_trait]
impl JobQueue for DirQueue {
    async fn enqueue(&self, request: &JobRequest) -> Result<JobId> {
        let bytes = request.to_descriptor_json()?;
        let id = JobId::generate();
        let path = self.descriptor_path(&id);
        let what = path.display().to_string();
        retry_io(self.retry, &what, || write_atomic(&path, &bytes)).await?;
        log::info!("Queued job {} with {} URLs", id, request.urls.len());
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Claim> {
        let mut claim = Claim::default();
        for id in self.pending().await? {
            let path = self.descriptor_path(&id);
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match JobDescriptor::from_json(id.clone(), &bytes) {
                Ok(job) => {
                    if self.try_claim(&job).await? {
                        claim.job = Some(job);
                        return Ok(claim);
                    }
                }
                Err(e) => {
                    log::warn!("Quarantining invalid job file {}: {}", path.display(), e);
                    self.quarantine(&id).await?;
                    claim.quarantined += 1;
                }
            }
        }
        Ok(claim)
    }

    async fn cancel_requested(&self, id: &JobId) -> Result<bool> {
        if fs::try_exists(self.cancel_marker_path(id)).await? {
            return Ok(true);
        }
        match self.read_status(id).await {
            Ok(Some(StatusRecord {
                state: JobState::Cancelled { .. },
                ..
            })) => Ok(true),
            Ok(_) => Ok(false),
            Err(e) => {
                log::warn!("Unreadable status for job {}: {}", id, e);
                Ok(false)
            }
        }
    }

    async fn record_progress(&self, progress: &Progress) -> Result<Boundary> {
        if self.cancel_requested(&progress.job_id).await? {
            return Ok(Boundary::CancelRequested);
        }
        self.write_status(&progress.job_id, progress.to_state()).await?;
        // A cancel that landed during the write above left its marker.
        if fs::try_exists(self.cancel_marker_path(&progress.job_id)).await? {
            return Ok(Boundary::CancelRequested);
        }
        Ok(Boundary::Continue)
    }

    async fn mark_terminal(&self, id: &JobId, state: JobState) -> Result<()> {
        self.write_status(id, state).await?;
        Self::remove_if_present(&self.cancel_marker_path(id)).await?;
        Ok(())
    }

    fn artifact_path(&self, id: &JobId) -> PathBuf {
        self.results_dir.join(self.format.file_name(id.as_str()))
    }

    async fn recover_orphans(&self) -> Result<Recovery> {
        let mut recovery = Recovery::default();
        let mut entries = fs::read_dir(&self.jobs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_suffix(STATUS_EXT))
                .and_then(|stem| JobId::parse(stem).ok())
            else {
                continue;
            };

            if !fs::try_exists(self.descriptor_path(&id)).await? {
                log::info!("Removing orphaned status for job {}", id);
                Self::remove_if_present(&entry.path()).await?;
                Self::remove_if_present(&self.cancel_marker_path(&id)).await?;
                recovery.orphans_removed += 1;
                continue;
            }

            match self.read_status(&id).await {
                Ok(Some(StatusRecord {
                    state: JobState::Processing { progress, total, .. },
                    ..
                })) => {
                    log::warn!("Job {} was interrupted by a worker restart", id);
                    let failed = JobState::failed("worker restarted while job was processing", progress, total);
                    self.write_status(&id, failed).await?;
                    Self::remove_if_present(&self.cancel_marker_path(&id)).await?;
                    recovery.interrupted.push(id);
                }
                Ok(_) => {}
                Err(e) => log::error!("Unreadable status for job {}: {}", id, e),
            }
        }
        Ok(recovery)
    }

    async fn purge_expired(&self, now: SystemTime, retention: &RetentionConfig) -> Result<usize> {
        let completed_ttl = retention.completed_ttl();
        let stale_ttl = retention.stale_ttl();
        let mut removed = 0;

        let mut entries = fs::read_dir(&self.jobs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let age = age_of(&entry.path(), now).await;

            if let Some(stem) = name.strip_suffix(STATUS_EXT) {
                let Ok(id) = JobId::parse(stem) else {
                    continue;
                };
                if age <= completed_ttl {
                    continue;
                }
                match self.read_status(&id).await {
                    Ok(Some(record)) if record.state.is_terminal() => {
                        removed += self.purge_job(&id).await?;
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Unreadable status for job {}: {}", id, e),
                }
            } else if let Some(stem) = name.strip_suffix(DESCRIPTOR_EXT) {
                let Ok(id) = JobId::parse(stem) else {
                    continue;
                };
                if age > stale_ttl && !fs::try_exists(self.status_path(&id)).await? {
                    removed += usize::from(Self::remove_if_present(&entry.path()).await?);
                }
            } else if [QUARANTINE_EXT, STAGING_EXT, CANCEL_EXT]
                .iter()
                .any(|ext| name.ends_with(*ext))
                && age > stale_ttl
            {
                removed += usize::from(Self::remove_if_present(&entry.path()).await?);
            }
        }

        let mut results = fs::read_dir(&self.results_dir).await?;
        while let Some(entry) = results.next_entry().await? {
            if age_of(&entry.path(), now).await > stale_ttl {
                removed += usize::from(Self::remove_if_present(&entry.path()).await?);
            }
        }

        if removed > 0 {
            log::info!("Cleanup removed {} expired files", removed);
        }
        Ok(removed)
    }
}

async fn age_of(path: &Path, now: SystemTime) -> Duration {
    fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .unwrap_or_default()
}

/// Writes a sibling temp file and renames it over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(STAGING_EXT);
    let staging = PathBuf::from(staging);
    fs::write(&staging, bytes).await?;
    fs::rename(&staging, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Provider;
    use tempfile::TempDir;

    fn queue(dir: &TempDir) -> DirQueue {
        DirQueue::new(dir.path().join("jobs"), dir.path().join("results"), ReportFormat::Csv)
    }

    async fn setup() -> (TempDir, DirQueue) {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir);
        queue.ensure_dirs().await.unwrap();
        (dir, queue)
    }

    async fn write_descriptor(queue: &DirQueue, id: &str, body: &str) -> JobId {
        let id = JobId::parse(id).unwrap();
        fs::write(queue.descriptor_path(&id), body).await.unwrap();
        id
    }

    fn later(hours: u64) -> SystemTime {
        SystemTime::now() + Duration::from_secs(hours * 3600)
    }

    #[tokio::test]
    async fn enqueue_then_claim_once() {
        let (_dir, queue) = setup().await;
        let id = queue
            .enqueue(&JobRequest::new(["example.com"]).with_source(Provider::Majestic, "key"))
            .await
            .unwrap();
        assert_eq!(queue.status(id.as_str()).await.unwrap(), JobView::Queued);

        let claimed = queue.claim_next().await.unwrap().job.unwrap();
        assert_eq!(claimed.id, id);
        assert!(claimed.providers.contains(Provider::Majestic));

        let view = queue.status(id.as_str()).await.unwrap();
        let JobView::Tracked(record) = view else {
            panic!("expected a status record");
        };
        assert_eq!(record.state.progress(), (0, 1));
        assert!(queue.claim_next().await.unwrap().job.is_none());
    }

    #[tokio::test]
    async fn claim_fails_when_status_already_exists() {
        let (_dir, queue) = setup().await;
        let id = write_descriptor(&queue, "taken", r#"{"urls": ["a.com"]}"#).await;
        let job = JobDescriptor::from_json(id.clone(), br#"{"urls": ["a.com"]}"#).unwrap();

        assert!(queue.try_claim(&job).await.unwrap());
        assert!(!queue.try_claim(&job).await.unwrap());
    }

    #[tokio::test]
    async fn claims_oldest_first() {
        let (_dir, queue) = setup().await;
        write_descriptor(&queue, "b-second", r#"{"urls": ["a.com"]}"#).await;
        write_descriptor(&queue, "a-first", r#"{"urls": ["a.com"]}"#).await;
        let old = std::fs::File::options()
            .write(true)
            .open(queue.jobs_dir().join("b-second.json"))
            .unwrap();
        old.set_modified(SystemTime::now() - Duration::from_secs(60)).unwrap();

        let first = queue.claim_next().await.unwrap().job.unwrap();
        assert_eq!(first.id.as_str(), "b-second");
        let second = queue.claim_next().await.unwrap().job.unwrap();
        assert_eq!(second.id.as_str(), "a-first");
    }

    #[tokio::test]
    async fn malformed_descriptor_is_quarantined() {
        let (_dir, queue) = setup().await;
        let id = write_descriptor(&queue, "broken", "{not json").await;

        let claim = queue.claim_next().await.unwrap();
        assert!(claim.job.is_none());
        assert_eq!(claim.quarantined, 1);
        assert!(!queue.descriptor_path(&id).exists());
        assert!(queue.quarantine_path(&id).exists());
        assert_eq!(queue.claim_next().await.unwrap().quarantined, 0);
    }

    #[tokio::test]
    async fn progress_never_overwrites_cancellation() {
        let (_dir, queue) = setup().await;
        let id = write_descriptor(&queue, "job", r#"{"urls": ["a.com", "b.com"]}"#).await;
        queue.claim_next().await.unwrap();

        let mut progress = Progress::new(id.clone(), 2);
        progress.processed = 1;
        assert_eq!(queue.record_progress(&progress).await.unwrap(), Boundary::Continue);

        assert_eq!(queue.cancel("job").await.unwrap(), CancelOutcome::CancelRequested);
        progress.processed = 2;
        assert_eq!(
            queue.record_progress(&progress).await.unwrap(),
            Boundary::CancelRequested
        );
        let record = queue.read_status(&id).await.unwrap().unwrap();
        assert!(matches!(record.state, JobState::Cancelled { progress: 1, .. }));
    }

    #[tokio::test]
    async fn cancel_survives_racing_progress_write() {
        let (_dir, queue) = setup().await;
        let id = write_descriptor(&queue, "job", r#"{"urls": ["a.com", "b.com", "c.com"]}"#).await;
        queue.claim_next().await.unwrap();
        assert_eq!(queue.cancel("job").await.unwrap(), CancelOutcome::CancelRequested);

        // A progress write that read the status just before the cancel.
        let mut progress = Progress::new(id.clone(), 3);
        progress.processed = 1;
        queue.write_status(&id, progress.to_state()).await.unwrap();
        assert!(matches!(
            queue.read_status(&id).await.unwrap().unwrap().state,
            JobState::Processing { .. }
        ));

        assert!(queue.cancel_requested(&id).await.unwrap());
        progress.processed = 2;
        assert_eq!(
            queue.record_progress(&progress).await.unwrap(),
            Boundary::CancelRequested
        );

        queue.mark_terminal(&id, progress.cancelled()).await.unwrap();
        assert!(!queue.cancel_marker_path(&id).exists());
    }

    #[tokio::test]
    async fn cancel_outcomes() {
        let (_dir, queue) = setup().await;
        write_descriptor(&queue, "waiting", r#"{"urls": ["a.com"]}"#).await;
        assert_eq!(queue.cancel("waiting").await.unwrap(), CancelOutcome::Dequeued);
        assert_eq!(queue.status("waiting").await.unwrap(), JobView::NotFound);
        assert_eq!(queue.cancel("waiting").await.unwrap(), CancelOutcome::NotFound);

        let id = write_descriptor(&queue, "done", r#"{"urls": ["a.com"]}"#).await;
        queue
            .mark_terminal(&id, JobState::failed("boom", 0, 1))
            .await
            .unwrap();
        assert_eq!(queue.cancel("done").await.unwrap(), CancelOutcome::AlreadyFinished);

        assert!(matches!(queue.cancel("../x").await, Err(Error::InvalidJobId(_))));
    }

    #[tokio::test]
    async fn download_requires_completed_status() {
        let (_dir, queue) = setup().await;
        let id = write_descriptor(&queue, "job", r#"{"urls": ["a.com"]}"#).await;
        assert!(matches!(queue.artifact("job").await, Err(Error::JobNotFound(_))));

        queue.claim_next().await.unwrap();
        fs::write(queue.artifact_path(&id), "URL\n").await.unwrap();
        assert!(matches!(queue.artifact("job").await, Err(Error::NotReady(_))));

        let done = crate::job::Summary { successful: 1, errors: 0 }.completed(&id, 1, Duration::from_secs(1));
        queue.mark_terminal(&id, done).await.unwrap();
        let artifact = queue.artifact("job").await.unwrap();
        assert_eq!(artifact.file_name, "job.csv");
        assert_eq!(artifact.content_type, "text/csv");
    }

    #[tokio::test]
    async fn startup_recovery() {
        let (_dir, queue) = setup().await;
        let orphan = JobId::parse("orphan").unwrap();
        queue
            .mark_terminal(&orphan, Progress::new(orphan.clone(), 3).to_state())
            .await
            .unwrap();

        let crashed = write_descriptor(&queue, "crashed", r#"{"urls": ["a.com"]}"#).await;
        queue.claim_next().await.unwrap();

        let recovery = queue.recover_orphans().await.unwrap();
        assert_eq!(recovery.orphans_removed, 1);
        assert_eq!(recovery.interrupted, vec![crashed.clone()]);
        assert!(!queue.status_path(&orphan).exists());

        let record = queue.read_status(&crashed).await.unwrap().unwrap();
        assert_eq!(
            record.state,
            JobState::failed("worker restarted while job was processing", 0, 1)
        );
    }

    #[tokio::test]
    async fn purge_respects_retention_windows() {
        let (_dir, queue) = setup().await;
        let retention = RetentionConfig::default();

        let finished = write_descriptor(&queue, "finished", r#"{"urls": ["a.com"]}"#).await;
        queue
            .mark_terminal(&finished, JobState::failed("boom", 0, 1))
            .await
            .unwrap();
        fs::write(queue.artifact_path(&finished), "x").await.unwrap();

        let running = write_descriptor(&queue, "running", r#"{"urls": ["a.com"]}"#).await;
        queue
            .mark_terminal(&running, Progress::new(running.clone(), 1).to_state())
            .await
            .unwrap();

        let waiting = write_descriptor(&queue, "waiting", r#"{"urls": ["a.com"]}"#).await;

        assert_eq!(queue.purge_expired(SystemTime::now(), &retention).await.unwrap(), 0);

        // Past the completed window but inside the stale window.
        assert_eq!(queue.purge_expired(later(25), &retention).await.unwrap(), 3);
        assert!(!queue.status_path(&finished).exists());
        assert!(!queue.artifact_path(&finished).exists());
        assert!(queue.status_path(&running).exists());
        assert!(queue.descriptor_path(&waiting).exists());

        assert_eq!(queue.purge_expired(later(24 * 8), &retention).await.unwrap(), 1);
        assert!(!queue.descriptor_path(&waiting).exists());
        assert!(queue.descriptor_path(&running).exists());
    }
}
