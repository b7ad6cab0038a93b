use super::{ReportRenderer, Table, export_error};
use crate::error::Result;

/// Plain comma-separated report with a header row.
pub struct CsvReport;

impl ReportRenderer for CsvReport {
    fn render(&self, table: &Table) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&table.headers).map_err(export_error)?;
        for row in &table.rows {
            writer.write_record(row).map_err(export_error)?;
        }
        writer.into_inner().map_err(export_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_cells_with_commas() {
        let table = Table {
            headers: vec!["URL", "Majestic Topics", "HTTPS"],
            rows: vec![vec!["http://a.com".into(), "Arts, Music".into(), "No".into()]],
        };
        let rendered = String::from_utf8(CsvReport.render(&table).unwrap()).unwrap();
        assert_eq!(rendered, "URL,Majestic Topics,HTTPS\nhttp://a.com,\"Arts, Music\",No\n");
    }
}
