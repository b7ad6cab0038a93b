use crate::error::Result;
use crate::normalize::NormalizedUrl;
use crate::record::{Provider, ProviderSet, ResultRecord, SourceMetrics, StatusCell};
use crate::sources::{Probe, SourceAdapter};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Builds the enricher for one job. Failing here is a job-level failure.
pub trait EnricherFactory: Send + Sync {
    fn connect(&self) -> Result<UrlEnricher>;
}

/// Fans one URL out to the probe and every enabled adapter under one outer deadline.
pub struct UrlEnricher {
    probe: Arc<dyn Probe>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    deadline: Duration,
}

impl UrlEnricher {
    pub fn new(probe: Arc<dyn Probe>, adapters: Vec<Arc<dyn SourceAdapter>>, deadline: Duration) -> Self {
        Self {
            probe,
            adapters,
            deadline,
        }
    }

    fn adapter(&self, provider: Provider) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|adapter| adapter.provider() == provider)
    }

    /// Never fails. When the deadline elapses, in-flight calls are dropped and
    /// the record is marked "Timeout" with every provider field "N/A".
    pub async fn enrich(&self, raw: &str, providers: &ProviderSet) -> ResultRecord {
        let url = NormalizedUrl::parse(raw);
        log::debug!("Processing URL: {}", url);

        match timeout(self.deadline, self.gather(&url, providers)).await {
            Ok(record) => record,
            Err(_) => {
                log::warn!("Timeout processing URL {} after {:?}", url, self.deadline);
                ResultRecord::degraded(url, StatusCell::Timeout, providers)
            }
        }
    }

    async fn gather(&self, url: &NormalizedUrl, providers: &ProviderSet) -> ResultRecord {
        let sources = providers.iter().map(|entry| async move {
            match self.adapter(entry.provider) {
                Some(adapter) => adapter
                    .fetch(url, entry.credential.as_ref())
                    .await
                    .into_metrics(entry.provider),
                None => SourceMetrics::unavailable(entry.provider),
            }
        });

        let (status, https, metrics) = futures::join!(
            self.probe.status(url),
            self.probe.https(url),
            join_all(sources)
        );

        ResultRecord {
            url: url.clone(),
            status,
            https,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MetricValue, Reachability};
    use crate::sources::SourceOutcome;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use tokio::time::Instant;

    struct FakeProbe;

    #[async_trait]
    impl Probe for FakeProbe {
        async fn status(&self, _url: &NormalizedUrl) -> StatusCell {
            StatusCell::Code(200)
        }

        async fn https(&self, url: &NormalizedUrl) -> Reachability {
            if url.host().starts_with("plain") {
                Reachability::No
            } else {
                Reachability::Yes
            }
        }
    }

    struct FakeAdapter {
        provider: Provider,
        delay: Duration,
        hang_on: Option<&'static str>,
    }

    impl FakeAdapter {
        fn new(provider: Provider, delay: Duration) -> Self {
            Self {
                provider,
                delay,
                hang_on: None,
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn fetch(&self, url: &NormalizedUrl, _credential: Option<&SecretString>) -> SourceOutcome {
            if self.hang_on == Some(url.host()) {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.delay).await;
            SourceOutcome::Ok(SourceMetrics::Majestic {
                topic: MetricValue::Text(url.host().to_string()),
            })
        }
    }

    fn majestic_only() -> ProviderSet {
        ProviderSet::new().with(Provider::Majestic, Some(SecretString::from("key")))
    }

    #[tokio::test(start_paused = true)]
    async fn adapters_run_concurrently() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(FakeAdapter::new(Provider::Majestic, Duration::from_secs(8))),
            Arc::new(FakeAdapter::new(Provider::Ahrefs, Duration::from_secs(8))),
            Arc::new(FakeAdapter::new(Provider::DataForSeo, Duration::from_secs(8))),
        ];
        let enricher = UrlEnricher::new(Arc::new(FakeProbe), adapters, Duration::from_secs(10));
        let providers = ProviderSet::new()
            .with(Provider::Majestic, None)
            .with(Provider::Ahrefs, None)
            .with(Provider::DataForSeo, None);

        let start = Instant::now();
        let record = enricher.enrich("https://www.Example.com/x", &providers).await;

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(record.url.to_string(), "http://example.com");
        assert_eq!(record.status, StatusCell::Code(200));
        assert_eq!(record.https, Reachability::Yes);
        assert_eq!(record.metrics.len(), 3);
        assert!(record.metrics_for(Provider::Majestic).is_some_and(|m| !m.is_unavailable()));
        // Fake returns Majestic-shaped data; other providers fall back to their own N/A shape.
        assert_eq!(
            record.metrics_for(Provider::Ahrefs),
            Some(&SourceMetrics::unavailable(Provider::Ahrefs))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_adapter_times_out_without_affecting_next_url() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FakeAdapter {
            provider: Provider::Majestic,
            delay: Duration::from_millis(10),
            hang_on: Some("slow.example"),
        })];
        let enricher = UrlEnricher::new(Arc::new(FakeProbe), adapters, Duration::from_secs(30));
        let providers = majestic_only();

        let start = Instant::now();
        let timed_out = enricher.enrich("slow.example", &providers).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));
        assert_eq!(timed_out.status, StatusCell::Timeout);
        assert_eq!(timed_out.https, Reachability::Unknown);
        assert_eq!(timed_out.metrics, vec![SourceMetrics::unavailable(Provider::Majestic)]);

        let sibling = enricher.enrich("fast.example", &providers).await;
        assert_eq!(sibling.status, StatusCell::Code(200));
        assert_eq!(
            sibling.metrics,
            vec![SourceMetrics::Majestic {
                topic: MetricValue::Text("fast.example".into())
            }]
        );
    }

    #[tokio::test]
    async fn enabled_provider_without_adapter_is_not_available() {
        let enricher = UrlEnricher::new(Arc::new(FakeProbe), Vec::new(), Duration::from_secs(5));
        let record = enricher.enrich("plain.example", &majestic_only()).await;

        assert_eq!(record.https, Reachability::No);
        assert_eq!(record.metrics, vec![SourceMetrics::unavailable(Provider::Majestic)]);
    }

    #[tokio::test]
    async fn record_fields_follow_enabled_set() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(FakeAdapter::new(Provider::Majestic, Duration::ZERO)),
            Arc::new(FakeAdapter::new(Provider::Ahrefs, Duration::ZERO)),
        ];
        let enricher = UrlEnricher::new(Arc::new(FakeProbe), adapters, Duration::from_secs(5));

        let none = enricher.enrich("example.com", &ProviderSet::new()).await;
        assert_eq!(
            none.field_names().into_iter().collect::<Vec<_>>(),
            vec!["secure", "status_code", "url"]
        );

        let ahrefs = enricher
            .enrich("example.com", &ProviderSet::new().with(Provider::Ahrefs, None))
            .await;
        let fields = ahrefs.field_names();
        assert!(fields.contains("ahrefs_dr"));
        assert!(!fields.contains("majestic_topics"));
        assert_eq!(fields.len(), 6);
    }
}
