use crate::normalize::NormalizedUrl;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

pub const NOT_AVAILABLE: &str = "N/A";

/// A third-party metrics provider. Declaration order is report column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Majestic,
    Ahrefs,
    DataForSeo,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Majestic, Provider::Ahrefs, Provider::DataForSeo];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Majestic => "Majestic",
            Provider::Ahrefs => "Ahrefs",
            Provider::DataForSeo => "DataForSEO",
        }
    }

    /// Report column headers contributed by this provider.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Provider::Majestic => &["Majestic Topics"],
            Provider::Ahrefs => &[
                "Ahrefs Referring Domains",
                "Ahrefs Traffic",
                "Ahrefs Domain Rating",
            ],
            Provider::DataForSeo => &[
                "DataForSEO Referring Domains",
                "DataForSEO Traffic",
                "DataForSEO Rank",
            ],
        }
    }

    /// Record field names, parallel to [`Provider::columns`].
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Provider::Majestic => &["majestic_topics"],
            Provider::Ahrefs => &["ahrefs_refdomains", "ahrefs_traffic", "ahrefs_dr"],
            Provider::DataForSeo => &[
                "dataforseo_referring_domains",
                "dataforseo_traffic",
                "dataforseo_rank",
            ],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct EnabledProvider {
    pub provider: Provider,
    pub credential: Option<SecretString>,
}

/// The providers a job enabled, in canonical order, each with its credential.
#[derive(Debug, Default)]
pub struct ProviderSet {
    enabled: Vec<EnabledProvider>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Provider, credential: Option<SecretString>) -> Self {
        self.enable(provider, credential);
        self
    }

    pub fn enable(&mut self, provider: Provider, credential: Option<SecretString>) {
        self.enabled.retain(|entry| entry.provider != provider);
        self.enabled.push(EnabledProvider {
            provider,
            credential,
        });
        self.enabled.sort_by_key(|entry| entry.provider);
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.enabled.iter().any(|entry| entry.provider == provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.enabled.iter().map(|entry| entry.provider)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnabledProvider> {
        self.enabled.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }
}

/// A single metric cell.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Text(String),
    Integer(i64),
    Float(f64),
    NotAvailable,
}

impl MetricValue {
    /// Strings and numbers keep their value; anything else is "N/A".
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => MetricValue::Text(s.clone()),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => MetricValue::Integer(i),
                None => n
                    .as_f64()
                    .map(MetricValue::Float)
                    .unwrap_or(MetricValue::NotAvailable),
            },
            _ => MetricValue::NotAvailable,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, MetricValue::NotAvailable)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::Integer(i) => write!(f, "{}", i),
            MetricValue::Float(x) => write!(f, "{}", x),
            MetricValue::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// HTTP status of the plain fetch, or why there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCell {
    Code(u16),
    Timeout,
    Error,
    NotAvailable,
}

impl StatusCell {
    /// "Timeout", "Error" and "N/A" all count against a job's success tally.
    pub fn is_error(&self) -> bool {
        !matches!(self, StatusCell::Code(_))
    }
}

impl fmt::Display for StatusCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCell::Code(code) => write!(f, "{}", code),
            StatusCell::Timeout => f.write_str("Timeout"),
            StatusCell::Error => f.write_str("Error"),
            StatusCell::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Yes,
    No,
    Unknown,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Yes => f.write_str("Yes"),
            Reachability::No => f.write_str("No"),
            Reachability::Unknown => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// One provider's fixed-shape contribution to a record.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceMetrics {
    Majestic {
        topic: MetricValue,
    },
    Ahrefs {
        referring_domains: MetricValue,
        traffic: MetricValue,
        domain_rating: MetricValue,
    },
    DataForSeo {
        referring_domains: MetricValue,
        traffic: MetricValue,
        rank: MetricValue,
    },
}

impl SourceMetrics {
    pub fn unavailable(provider: Provider) -> Self {
        match provider {
            Provider::Majestic => SourceMetrics::Majestic {
                topic: MetricValue::NotAvailable,
            },
            Provider::Ahrefs => SourceMetrics::Ahrefs {
                referring_domains: MetricValue::NotAvailable,
                traffic: MetricValue::NotAvailable,
                domain_rating: MetricValue::NotAvailable,
            },
            Provider::DataForSeo => SourceMetrics::DataForSeo {
                referring_domains: MetricValue::NotAvailable,
                traffic: MetricValue::NotAvailable,
                rank: MetricValue::NotAvailable,
            },
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            SourceMetrics::Majestic { .. } => Provider::Majestic,
            SourceMetrics::Ahrefs { .. } => Provider::Ahrefs,
            SourceMetrics::DataForSeo { .. } => Provider::DataForSeo,
        }
    }

    /// Cells in the order of [`Provider::columns`].
    pub fn cells(&self) -> Vec<&MetricValue> {
        match self {
            SourceMetrics::Majestic { topic } => vec![topic],
            SourceMetrics::Ahrefs {
                referring_domains,
                traffic,
                domain_rating,
            } => vec![referring_domains, traffic, domain_rating],
            SourceMetrics::DataForSeo {
                referring_domains,
                traffic,
                rank,
            } => vec![referring_domains, traffic, rank],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.cells().iter().all(|cell| !cell.is_available())
    }
}

/// Enrichment result for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub url: NormalizedUrl,
    pub status: StatusCell,
    pub https: Reachability,
    /// Exactly one entry per enabled provider, in canonical order.
    pub metrics: Vec<SourceMetrics>,
}

impl ResultRecord {
    /// A record whose every provider field is "N/A", used when a URL could not be enriched at all.
    pub fn degraded(url: NormalizedUrl, status: StatusCell, providers: &ProviderSet) -> Self {
        Self {
            url,
            status,
            https: Reachability::Unknown,
            metrics: providers.providers().map(SourceMetrics::unavailable).collect(),
        }
    }

    pub fn metrics_for(&self, provider: Provider) -> Option<&SourceMetrics> {
        self.metrics.iter().find(|m| m.provider() == provider)
    }

    /// Names of the fields this record carries.
    pub fn field_names(&self) -> BTreeSet<&'static str> {
        let mut fields: BTreeSet<&'static str> = ["url", "status_code", "secure"].into_iter().collect();
        for metrics in &self.metrics {
            fields.extend(metrics.provider().fields().iter().copied());
        }
        fields
    }
}
