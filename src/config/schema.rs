use crate::output::ReportFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WorkerConfig {
    /// Directory holding job descriptors (`<id>.json`) and status records (`<id>.status`).
    pub jobs_dir: PathBuf,

    /// Directory holding finished report artifacts.
    pub results_dir: PathBuf,

    #[validate(range(min = 100))]
    pub poll_interval_ms: u64,

    #[validate(range(min = 100))]
    pub error_backoff_ms: u64,

    #[validate(range(min = 1))]
    pub heartbeat_interval_secs: u64,

    /// Outer deadline for enriching a single URL.
    #[validate(range(min = 1))]
    pub url_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,

    /// Timeout for the status-code fetch and the HTTPS probe.
    #[validate(range(min = 1))]
    pub probe_timeout_secs: u64,

    /// Cap on concurrently open outbound requests.
    #[validate(range(min = 1, max = 1024))]
    pub max_connections: usize,

    #[validate(length(min = 1))]
    pub user_agent: String,

    #[validate]
    pub retention: RetentionConfig,

    #[validate]
    pub export: ExportConfig,

    #[validate]
    pub rate_limits: RateLimitsConfig,

    #[validate]
    pub endpoints: EndpointsConfig,

    /// Optional path to a parent configuration file to inherit from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("jobs"),
            results_dir: PathBuf::from("results"),
            poll_interval_ms: 5_000,
            error_backoff_ms: 10_000,
            heartbeat_interval_secs: 600,
            url_timeout_secs: 30,
            request_timeout_secs: 15,
            connect_timeout_secs: 15,
            probe_timeout_secs: 10,
            max_connections: 20,
            user_agent: format!("seo-enricher/{}", env!("CARGO_PKG_VERSION")),
            retention: RetentionConfig::default(),
            export: ExportConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            endpoints: EndpointsConfig::default(),
            extends: None,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn url_timeout(&self) -> Duration {
        Duration::from_secs(self.url_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetentionConfig {
    /// Age after which terminal jobs are removed.
    #[validate(range(min = 1))]
    pub completed_hours: u64,

    /// Age after which unclaimed descriptors, quarantined files and stray artifacts are removed.
    #[validate(range(min = 1))]
    pub stale_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_hours: 24,
            stale_hours: 7 * 24,
        }
    }
}

impl RetentionConfig {
    pub fn completed_ttl(&self) -> Duration {
        Duration::from_secs(self.completed_hours * 3600)
    }

    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.stale_hours * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ReportFormat,

    #[validate(range(min = 1, max = 10))]
    pub write_attempts: u32,

    pub write_backoff_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            write_attempts: 3,
            write_backoff_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RatePolicy {
    #[validate(range(min = 1))]
    pub calls: usize,

    #[validate(range(min = 1))]
    pub window_ms: u64,
}

impl RatePolicy {
    pub const fn new(calls: usize, window: Duration) -> Self {
        Self {
            calls,
            window_ms: window.as_millis() as u64,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitsConfig {
    #[validate]
    pub majestic: RatePolicy,
    #[validate]
    pub ahrefs: RatePolicy,
    #[validate]
    pub dataforseo: RatePolicy,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            majestic: RatePolicy::new(300, Duration::from_secs(1)),
            ahrefs: RatePolicy::new(60, Duration::from_secs(60)),
            dataforseo: RatePolicy::new(500, Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Full URL of the Majestic JSON API.
    #[validate(url)]
    pub majestic: String,

    /// Base URL of the Ahrefs site-explorer API.
    #[validate(url)]
    pub ahrefs: String,

    /// Base URL of the DataForSEO v3 API.
    #[validate(url)]
    pub dataforseo: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            majestic: "https://api.majestic.com/api/json".to_string(),
            ahrefs: "https://api.ahrefs.com/v3/site-explorer".to_string(),
            dataforseo: "https://sandbox.dataforseo.com/v3".to_string(),
        }
    }
}
