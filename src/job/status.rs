use super::JobId;
use crate::record::ResultRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Contents of a `<id>.status` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(flatten)]
    pub state: JobState,
}

impl StatusRecord {
    pub fn new(id: &JobId, state: JobState) -> Self {
        Self {
            job_id: Some(id.to_string()),
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobState {
    Processing {
        progress: usize,
        total: usize,
        #[serde(default)]
        elapsed_seconds: f64,
        #[serde(default)]
        estimated_remaining_seconds: f64,
    },
    Completed {
        progress: usize,
        total: usize,
        successful: usize,
        errors: usize,
        duration_seconds: f64,
        avg_time_per_url: f64,
        download_url: String,
    },
    Error {
        error: String,
        #[serde(default)]
        progress: usize,
        #[serde(default)]
        total: usize,
    },
    Cancelled {
        #[serde(default)]
        progress: usize,
        #[serde(default)]
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_seconds: Option<f64>,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing { .. })
    }

    pub fn progress(&self) -> (usize, usize) {
        match self {
            Self::Processing { progress, total, .. }
            | Self::Completed { progress, total, .. }
            | Self::Error { progress, total, .. }
            | Self::Cancelled { progress, total, .. } => (*progress, *total),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Processing { .. } => "processing",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn failed(error: impl Into<String>, progress: usize, total: usize) -> Self {
        Self::Error {
            error: error.into(),
            progress,
            total,
        }
    }
}

/// Path the front end serves a finished job's artifact from.
pub fn download_url(id: &JobId) -> String {
    format!("/download_result/{}", id)
}

/// Snapshot published after each URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub job_id: JobId,
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl Progress {
    pub fn new(job_id: JobId, total: usize) -> Self {
        Self {
            job_id,
            processed: 0,
            total,
            elapsed: Duration::ZERO,
        }
    }

    /// Mean time per processed URL times the URLs left; zero before the first one.
    pub fn remaining(&self) -> Duration {
        if self.processed == 0 {
            return Duration::ZERO;
        }
        let left = self.total.saturating_sub(self.processed);
        self.elapsed.mul_f64(left as f64 / self.processed as f64)
    }

    pub fn to_state(&self) -> JobState {
        JobState::Processing {
            progress: self.processed,
            total: self.total,
            elapsed_seconds: self.elapsed.as_secs_f64(),
            estimated_remaining_seconds: self.remaining().as_secs_f64(),
        }
    }

    pub fn cancelled(&self) -> JobState {
        JobState::Cancelled {
            progress: self.processed,
            total: self.total,
            elapsed_seconds: Some(self.elapsed.as_secs_f64()),
        }
    }
}

/// Tally of a finished job. Only a record with an actual status code counts
/// as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub successful: usize,
    pub errors: usize,
}

impl Summary {
    pub fn tally(records: &[ResultRecord]) -> Self {
        let errors = records.iter().filter(|r| r.status.is_error()).count();
        Self {
            successful: records.len() - errors,
            errors,
        }
    }

    pub fn completed(self, id: &JobId, total: usize, duration: Duration) -> JobState {
        let processed = self.successful + self.errors;
        let duration_seconds = duration.as_secs_f64();
        JobState::Completed {
            progress: processed,
            total,
            successful: self.successful,
            errors: self.errors,
            duration_seconds,
            avg_time_per_url: if processed == 0 {
                0.0
            } else {
                duration_seconds / processed as f64
            },
            download_url: download_url(id),
        }
    }
}
