use super::{FetchError, HttpPool, SourceAdapter, SourceOutcome};
use crate::limiter::RateLimiter;
use crate::normalize::NormalizedUrl;
use crate::record::{MetricValue, Provider, SourceMetrics};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::sync::Arc;

/// Topic lookup: one GET, first ranked topic of the first table.
pub struct MajesticAdapter {
    pool: HttpPool,
    limiter: Arc<RateLimiter>,
    endpoint: String,
}

impl MajesticAdapter {
    pub fn new(pool: HttpPool, limiter: Arc<RateLimiter>, endpoint: String) -> Self {
        Self {
            pool,
            limiter,
            endpoint,
        }
    }

    async fn topic(&self, host: &str, api_key: &str) -> Result<MetricValue, FetchError> {
        self.limiter.admit().await;

        let request = self.pool.client().get(&self.endpoint).query(&[
            ("app_api_key", api_key),
            ("cmd", "GetTopics"),
            ("datasource", "fresh"),
            ("Item", host),
            ("Count", "100"),
            ("SortOrder", "desc"),
        ]);
        let body = self.pool.json(request).await?;
        first_topic(&body)
    }
}

fn first_topic(body: &Value) -> Result<MetricValue, FetchError> {
    match body.get("Code").and_then(Value::as_str) {
        Some("OK") => {}
        other => {
            return Err(FetchError::Rejected(
                other.unwrap_or("missing Code").to_string(),
            ));
        }
    }

    Ok(MetricValue::from_json(
        body.pointer("/DataTables/Topics/Data/0/Topic"),
    ))
}

#[async_trait]
impl SourceAdapter for MajesticAdapter {
    fn provider(&self) -> Provider {
        Provider::Majestic
    }

    async fn fetch(&self, url: &NormalizedUrl, credential: Option<&SecretString>) -> SourceOutcome {
        let Some(api_key) = credential
            .map(|c| c.expose_secret())
            .filter(|key| !key.is_empty())
        else {
            return SourceOutcome::Degraded("missing API key".into());
        };

        match self.topic(url.host(), api_key).await {
            Ok(topic) => SourceOutcome::Ok(SourceMetrics::Majestic { topic }),
            Err(e) => {
                log::warn!("Majestic API error for {}: {}", url, e);
                SourceOutcome::Degraded(e.to_string())
            }
        }
    }
}
