use super::{FetchError, HttpPool, SourceAdapter, SourceOutcome, endpoint};
use crate::limiter::RateLimiter;
use crate::normalize::NormalizedUrl;
use crate::record::{MetricValue, Provider, SourceMetrics};
use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

const OK_STATUS: i64 = 20000;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+(-[a-z0-9]+)*\.)+[a-z]{2,}$").expect("hostname pattern is valid")
});

/// Backlinks summary and bulk traffic estimate, authenticated with a
/// `login:password` credential.
pub struct DataForSeoAdapter {
    pool: HttpPool,
    limiter: Arc<RateLimiter>,
    base: String,
}

struct Backlinks {
    referring_domains: MetricValue,
    rank: MetricValue,
}

impl DataForSeoAdapter {
    pub fn new(pool: HttpPool, limiter: Arc<RateLimiter>, base: String) -> Self {
        Self {
            pool,
            limiter,
            base,
        }
    }

    async fn post(
        &self,
        path: &str,
        login: &str,
        password: &str,
        payload: &Value,
    ) -> Result<Value, FetchError> {
        self.limiter.admit().await;

        let request = self
            .pool
            .client()
            .post(endpoint(&self.base, path))
            .basic_auth(login, Some(password))
            .json(payload);
        let body = self.pool.json(request).await?;

        match body.get("status_code").and_then(Value::as_i64) {
            Some(OK_STATUS) => Ok(body),
            other => Err(FetchError::Rejected(format!(
                "status_code {}",
                other.map_or_else(|| "missing".to_string(), |code| code.to_string())
            ))),
        }
    }

    async fn backlinks(&self, domain: &str, login: &str, password: &str) -> Result<Backlinks, FetchError> {
        let payload = json!({
            "0": {
                "target": domain,
                "include_subdomains": true,
                "backlinks_filters": ["dofollow", "=", true],
                "backlinks_status_type": "live"
            }
        });
        let body = self
            .post("backlinks/summary/live", login, password, &payload)
            .await?;

        let result = body
            .pointer("/tasks/0/result/0")
            .ok_or_else(|| FetchError::Rejected("empty backlinks result".into()))?;
        Ok(Backlinks {
            referring_domains: MetricValue::from_json(result.get("referring_main_domains")),
            rank: MetricValue::from_json(result.get("rank")),
        })
    }

    async fn traffic(&self, domain: &str, login: &str, password: &str) -> Result<MetricValue, FetchError> {
        let payload = json!([{
            "targets": [domain],
            "location_name": "United States",
            "language_name": "English"
        }]);
        let body = self
            .post(
                "dataforseo_labs/google/bulk_traffic_estimation/live",
                login,
                password,
                &payload,
            )
            .await?;

        Ok(MetricValue::from_json(
            body.pointer("/tasks/0/result/0/items/0/metrics/organic/etv"),
        ))
    }
}

/// Splits `login:password`; exactly one colon, both halves non-empty.
pub fn parse_credential(raw: &str) -> Option<(&str, &str)> {
    let (login, password) = raw.split_once(':')?;
    if login.is_empty() || password.is_empty() || password.contains(':') {
        return None;
    }
    Some((login, password))
}

/// Bare domain for the API, or `None` when it fails the strict hostname check.
pub fn clean_domain(url: &NormalizedUrl) -> Option<String> {
    let domain = url
        .host()
        .split(['/', '?', ':'])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    HOSTNAME.is_match(&domain).then_some(domain)
}

#[async_trait]
impl SourceAdapter for DataForSeoAdapter {
    fn provider(&self) -> Provider {
        Provider::DataForSeo
    }

    async fn fetch(&self, url: &NormalizedUrl, credential: Option<&SecretString>) -> SourceOutcome {
        let Some(credential) = credential else {
            return SourceOutcome::Degraded("missing API key".into());
        };
        let Some((login, password)) = parse_credential(credential.expose_secret()) else {
            log::error!("Invalid API key format for DataForSEO. Expected 'login:password'");
            return SourceOutcome::Degraded("invalid credential".into());
        };
        let Some(domain) = clean_domain(url) else {
            log::debug!("Skipping DataForSEO for {}: not a valid hostname", url);
            return SourceOutcome::Degraded("invalid domain".into());
        };

        let (referring_domains, rank) = match self.backlinks(&domain, login, password).await {
            Ok(backlinks) => (backlinks.referring_domains, backlinks.rank),
            Err(e) => {
                log::warn!("DataForSEO backlinks failed for {}: {}", url, e);
                (MetricValue::NotAvailable, MetricValue::NotAvailable)
            }
        };

        let traffic = match self.traffic(&domain, login, password).await {
            Ok(traffic) => traffic,
            Err(e) => {
                log::warn!("DataForSEO traffic failed for {}: {}", url, e);
                MetricValue::NotAvailable
            }
        };

        SourceOutcome::Ok(SourceMetrics::DataForSeo {
            referring_domains,
            traffic,
            rank,
        })
    }
}
