use super::HttpPool;
use crate::normalize::NormalizedUrl;
use crate::record::{Reachability, StatusCell};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

/// The two always-on checks: plain status code and HTTPS reachability.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn status(&self, url: &NormalizedUrl) -> StatusCell;

    /// "Yes" only for a 200 over HTTPS; any failure is "No".
    async fn https(&self, url: &NormalizedUrl) -> Reachability;
}

pub struct HttpProbe {
    pool: HttpPool,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(pool: HttpPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn status(&self, url: &NormalizedUrl) -> StatusCell {
        let Ok(target) = Url::parse(&url.http()) else {
            log::debug!("Unparseable URL {}, skipping status fetch", url);
            return StatusCell::NotAvailable;
        };

        let request = self.pool.client().get(target).timeout(self.timeout);
        match self.pool.status(request).await {
            Ok(status) => StatusCell::Code(status.as_u16()),
            Err(e) => {
                log::debug!("Status fetch failed for {}: {}", url, e);
                StatusCell::NotAvailable
            }
        }
    }

    async fn https(&self, url: &NormalizedUrl) -> Reachability {
        let Ok(target) = Url::parse(&url.https()) else {
            return Reachability::No;
        };

        let request = self.pool.client().get(target).timeout(self.timeout);
        match self.pool.status(request).await {
            Ok(StatusCode::OK) => Reachability::Yes,
            Ok(status) => {
                log::debug!("HTTPS probe for {} returned {}", url, status);
                Reachability::No
            }
            Err(e) => {
                log::debug!("HTTPS probe failed for {}: {}", url, e);
                Reachability::No
            }
        }
    }
}
