//! Data-source adapters.
//!
//! Every adapter resolves to a [`SourceOutcome`]; transport failures, bad
//! payloads and missing credentials never escape as errors. The enricher
//! turns `Degraded` into the provider's all-"N/A" shape.

pub mod ahrefs;
pub mod dataforseo;
pub mod majestic;
pub mod probe;

use crate::config::WorkerConfig;
use crate::enricher::{EnricherFactory, UrlEnricher};
use crate::error::Result;
use crate::limiter::RateLimiters;
use crate::normalize::NormalizedUrl;
use crate::record::{Provider, SourceMetrics};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

pub use ahrefs::AhrefsAdapter;
pub use dataforseo::DataForSeoAdapter;
pub use majestic::MajesticAdapter;
pub use probe::{HttpProbe, Probe};

#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Ok(SourceMetrics),
    Degraded(String),
}

impl SourceOutcome {
    pub fn into_metrics(self, provider: Provider) -> SourceMetrics {
        match self {
            SourceOutcome::Ok(metrics) if metrics.provider() == provider => metrics,
            SourceOutcome::Ok(_) | SourceOutcome::Degraded(_) => SourceMetrics::unavailable(provider),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch(&self, url: &NormalizedUrl, credential: Option<&SecretString>) -> SourceOutcome;
}

/// Failure of a single provider sub-call. Stays inside the adapters.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("provider reported failure: {0}")]
    Rejected(String),
}

/// Shared HTTP client with a cap on concurrently open requests.
#[derive(Clone)]
pub struct HttpPool {
    client: Client,
    permits: Arc<Semaphore>,
}

impl HttpPool {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.max_connections)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self::with_client(client, config.max_connections))
    }

    pub fn with_client(client: Client, max_connections: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends the request and returns only its status; the body is dropped.
    pub async fn status(&self, request: RequestBuilder) -> std::result::Result<StatusCode, FetchError> {
        let _permit = self.permits.acquire().await.ok();
        let response = request.send().await?;
        Ok(response.status())
    }

    /// Sends the request and decodes a 2xx JSON body. The permit is held until the body is read.
    pub async fn json(&self, request: RequestBuilder) -> std::result::Result<Value, FetchError> {
        let _permit = self.permits.acquire().await.ok();
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.json::<Value>().await?)
    }
}

/// Builds a fresh connection pool and adapter set per job, sharing the
/// process-wide rate limiters.
pub struct Sources {
    config: WorkerConfig,
    limiters: RateLimiters,
}

impl Sources {
    pub fn new(config: WorkerConfig, limiters: RateLimiters) -> Self {
        Self { config, limiters }
    }
}

impl EnricherFactory for Sources {
    fn connect(&self) -> Result<UrlEnricher> {
        let pool = HttpPool::new(&self.config)?;
        let endpoints = &self.config.endpoints;

        let probe = Arc::new(HttpProbe::new(pool.clone(), self.config.probe_timeout()));
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(MajesticAdapter::new(
                pool.clone(),
                self.limiters.majestic.clone(),
                endpoints.majestic.clone(),
            )),
            Arc::new(AhrefsAdapter::new(
                pool.clone(),
                self.limiters.ahrefs.clone(),
                endpoints.ahrefs.clone(),
            )),
            Arc::new(DataForSeoAdapter::new(
                pool,
                self.limiters.dataforseo.clone(),
                endpoints.dataforseo.clone(),
            )),
        ];

        Ok(UrlEnricher::new(probe, adapters, self.config.url_timeout()))
    }
}

/// Joins a configured base URL and an endpoint path without doubling slashes.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.example.com/v3/", "/metrics"),
            "https://api.example.com/v3/metrics"
        );
        assert_eq!(endpoint("http://h", "a/b"), "http://h/a/b");
    }

    #[test]
    fn mismatched_or_degraded_outcomes_become_unavailable() {
        let degraded = SourceOutcome::Degraded("boom".into()).into_metrics(Provider::Ahrefs);
        assert_eq!(degraded, SourceMetrics::unavailable(Provider::Ahrefs));

        let wrong = SourceOutcome::Ok(SourceMetrics::unavailable(Provider::Majestic))
            .into_metrics(Provider::DataForSeo);
        assert_eq!(wrong.provider(), Provider::DataForSeo);
    }
}
