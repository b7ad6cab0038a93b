use crate::error::{Error, Result};
use crate::job::store::write_atomic;
use crate::record::{Provider, ProviderSet, ResultRecord};
use crate::retry::{RetryPolicy, retry_io};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod csv;
pub mod ods;

pub use self::csv::CsvReport;
pub use self::ods::{FlatOdsReport, OdsReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Ods,
    Fods,
    Csv,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Ods, ReportFormat::Fods, ReportFormat::Csv];

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Ods => "ods",
            ReportFormat::Fods => "fods",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Ods => ods::ODS_MIMETYPE,
            ReportFormat::Fods => "application/vnd.oasis.opendocument.spreadsheet-flat-xml",
            ReportFormat::Csv => "text/csv",
        }
    }

    pub fn file_name(&self, job_id: &str) -> String {
        format!("{}.{}", job_id, self.extension())
    }

    fn renderer(&self) -> &'static dyn ReportRenderer {
        match self {
            ReportFormat::Ods => &OdsReport,
            ReportFormat::Fods => &FlatOdsReport,
            ReportFormat::Csv => &CsvReport,
        }
    }
}

/// Header row plus one text row per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn headers(providers: &ProviderSet) -> Vec<&'static str> {
        let mut headers = vec!["URL", "Status Code"];
        for provider in providers.providers() {
            headers.extend_from_slice(provider.columns());
        }
        headers.push("HTTPS");
        headers
    }

    pub fn build(records: &[ResultRecord], providers: &ProviderSet) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                let mut row = vec![record.url.to_string(), record.status.to_string()];
                for provider in providers.providers() {
                    row.extend(cells_for(record, provider));
                }
                row.push(record.https.to_string());
                row
            })
            .collect();

        Self {
            headers: Self::headers(providers),
            rows,
        }
    }
}

fn cells_for(record: &ResultRecord, provider: Provider) -> Vec<String> {
    match record.metrics_for(provider) {
        Some(metrics) => metrics.cells().into_iter().map(ToString::to_string).collect(),
        None => vec![crate::record::NOT_AVAILABLE.to_string(); provider.columns().len()],
    }
}

pub trait ReportRenderer: Send + Sync {
    fn render(&self, table: &Table) -> Result<Vec<u8>>;
}

/// Writes the result table of a finished job.
#[derive(Debug, Clone, Copy)]
pub struct Exporter {
    format: ReportFormat,
    retry: RetryPolicy,
}

impl Exporter {
    pub fn new(format: ReportFormat, retry: RetryPolicy) -> Self {
        Self { format, retry }
    }

    /// Pure rendering: identical input yields identical bytes.
    pub fn render(&self, records: &[ResultRecord], providers: &ProviderSet) -> Result<Vec<u8>> {
        self.format.renderer().render(&Table::build(records, providers))
    }

    pub async fn export(&self, records: &[ResultRecord], providers: &ProviderSet, path: &Path) -> Result<()> {
        let bytes = self.render(records, providers)?;
        let what = path.display().to_string();
        retry_io(self.retry, &what, || write_atomic(path, &bytes)).await?;
        log::info!("Wrote {} rows to {}", records.len(), path.display());
        Ok(())
    }
}

pub(crate) fn export_error(e: impl std::fmt::Display) -> Error {
    Error::Export(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizedUrl;
    use crate::record::{MetricValue, Reachability, SourceMetrics, StatusCell};
    use tempfile::TempDir;

    fn providers() -> ProviderSet {
        ProviderSet::new()
            .with(Provider::DataForSeo, None)
            .with(Provider::Majestic, None)
    }

    fn records() -> Vec<ResultRecord> {
        vec![
            ResultRecord {
                url: NormalizedUrl::parse("https://www.example.com"),
                status: StatusCell::Code(200),
                https: Reachability::Yes,
                metrics: vec![
                    SourceMetrics::Majestic {
                        topic: MetricValue::Text("Computers/Internet".into()),
                    },
                    SourceMetrics::DataForSeo {
                        referring_domains: MetricValue::Integer(1200),
                        traffic: MetricValue::Float(345.5),
                        rank: MetricValue::NotAvailable,
                    },
                ],
            },
            ResultRecord::degraded(NormalizedUrl::parse("slow.example"), StatusCell::Timeout, &providers()),
        ]
    }

    #[test]
    fn columns_follow_canonical_order() {
        assert_eq!(
            Table::headers(&providers()),
            vec![
                "URL",
                "Status Code",
                "Majestic Topics",
                "DataForSEO Referring Domains",
                "DataForSEO Traffic",
                "DataForSEO Rank",
                "HTTPS",
            ]
        );
        assert_eq!(Table::headers(&ProviderSet::new()), vec!["URL", "Status Code", "HTTPS"]);
    }

    #[test]
    fn rows_render_typed_cells() {
        let table = Table::build(&records(), &providers());
        assert_eq!(
            table.rows[0],
            vec!["http://example.com", "200", "Computers/Internet", "1200", "345.5", "N/A", "Yes"]
        );
        assert_eq!(
            table.rows[1],
            vec!["http://slow.example", "Timeout", "N/A", "N/A", "N/A", "N/A", "N/A"]
        );
    }

    #[test]
    fn missing_metrics_fill_with_sentinel() {
        let mut record = records().remove(0);
        record.metrics.clear();
        let table = Table::build(&[record], &providers());
        assert_eq!(table.rows[0][2..6], ["N/A", "N/A", "N/A", "N/A"]);
    }

    #[test]
    fn rendering_is_deterministic() {
        for format in ReportFormat::ALL {
            let exporter = Exporter::new(format, RetryPolicy::default());
            let first = exporter.render(&records(), &providers()).unwrap();
            let second = exporter.render(&records(), &providers()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn spreadsheet_artifacts_are_named_by_job_id() {
        assert_eq!(ReportFormat::default().file_name("abc"), "abc.ods");
        assert_eq!(
            ReportFormat::Ods.content_type(),
            "application/vnd.oasis.opendocument.spreadsheet"
        );
        assert_eq!(ReportFormat::Fods.file_name("abc"), "abc.fods");
    }

    #[tokio::test]
    async fn export_writes_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.csv");
        let exporter = Exporter::new(ReportFormat::Csv, RetryPolicy::default());

        exporter.export(&records(), &providers(), &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("URL,Status Code,Majestic Topics,"));
        assert_eq!(written.lines().count(), 3);
        assert!(!dir.path().join("job.csv.tmp").exists());
    }
}
