use super::{FetchError, HttpPool, SourceAdapter, SourceOutcome, endpoint};
use crate::limiter::RateLimiter;
use crate::normalize::NormalizedUrl;
use crate::record::{MetricValue, Provider, SourceMetrics};
use async_trait::async_trait;
use chrono::{Datelike, Days, Local, NaiveDate};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Domain rating, referring domains and organic traffic, fetched as three
/// independent calls so one failure leaves the other two cells intact.
pub struct AhrefsAdapter {
    pool: HttpPool,
    limiter: Arc<RateLimiter>,
    base: String,
}

struct Query {
    path: &'static str,
    params: Vec<(&'static str, String)>,
    pointer: &'static str,
}

impl AhrefsAdapter {
    pub fn new(pool: HttpPool, limiter: Arc<RateLimiter>, base: String) -> Self {
        Self {
            pool,
            limiter,
            base,
        }
    }

    async fn metric(&self, url: &NormalizedUrl, token: &str, query: Query) -> MetricValue {
        match self.call(token, &query).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Ahrefs {} failed for {}: {}", query.path, url, e);
                MetricValue::NotAvailable
            }
        }
    }

    async fn call(&self, token: &str, query: &Query) -> Result<MetricValue, FetchError> {
        self.limiter.admit().await;

        let request = self
            .pool
            .client()
            .get(endpoint(&self.base, query.path))
            .bearer_auth(token)
            .query(&query.params);
        let body = self.pool.json(request).await?;
        Ok(MetricValue::from_json(body.pointer(query.pointer)))
    }
}

fn yesterday(today: NaiveDate) -> String {
    today
        .checked_sub_days(Days::new(1))
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

fn first_of_month(today: NaiveDate) -> String {
    today
        .with_day(1)
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

#[async_trait]
impl SourceAdapter for AhrefsAdapter {
    fn provider(&self) -> Provider {
        Provider::Ahrefs
    }

    async fn fetch(&self, url: &NormalizedUrl, credential: Option<&SecretString>) -> SourceOutcome {
        let Some(token) = credential
            .map(|c| c.expose_secret())
            .filter(|token| !token.is_empty())
        else {
            return SourceOutcome::Degraded("missing API key".into());
        };

        let today = Local::now().date_naive();
        let target = url.to_string();

        let domain_rating = self
            .metric(
                url,
                token,
                Query {
                    path: "domain-rating",
                    params: vec![("target", target.clone()), ("date", yesterday(today))],
                    pointer: "/domain_rating/domain_rating",
                },
            )
            .await;

        let referring_domains = self
            .metric(
                url,
                token,
                Query {
                    path: "refdomains-history",
                    params: vec![
                        ("target", target.clone()),
                        ("mode", "domain".into()),
                        ("protocol", "both".into()),
                        ("date_from", yesterday(today)),
                    ],
                    pointer: "/refdomains",
                },
            )
            .await;

        let traffic = self
            .metric(
                url,
                token,
                Query {
                    path: "metrics",
                    params: vec![
                        ("target", target),
                        ("mode", "domain".into()),
                        ("protocol", "both".into()),
                        ("date", first_of_month(today)),
                    ],
                    pointer: "/metrics/org_traffic",
                },
            )
            .await;

        SourceOutcome::Ok(SourceMetrics::Ahrefs {
            referring_domains,
            traffic,
            domain_rating,
        })
    }
}
