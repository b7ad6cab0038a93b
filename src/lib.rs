pub mod config;
pub mod enricher;
pub mod error;
pub mod job;
pub mod limiter;
pub mod metrics;
pub mod normalize;
pub mod output;
pub mod processor;
pub mod record;
pub mod retry;
pub mod sources;
pub mod worker;

pub use enricher::{EnricherFactory, UrlEnricher};
pub use error::{Error, Result};
pub use job::{DirQueue, JobQueue};
pub use metrics::collector::MetricsCollector;
pub use metrics::snapshot::MetricsSnapshot;
pub use processor::{JobOutcome, JobProcessor};
pub use worker::QueueWatcher;
