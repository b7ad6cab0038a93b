use super::{ReportRenderer, Table, export_error};
use crate::error::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::borrow::Cow;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const SHEET_NAME: &str = "Results";

pub(crate) const ODS_MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const NAMESPACES: [(&str, &str); 3] = [
    ("xmlns:office", "urn:oasis:names:tc:opendocument:xmlns:office:1.0"),
    ("xmlns:table", "urn:oasis:names:tc:opendocument:xmlns:table:1.0"),
    ("xmlns:text", "urn:oasis:names:tc:opendocument:xmlns:text:1.0"),
];

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:version="1.2" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>
"#;

/// Packaged OpenDocument spreadsheet (`.ods`): `mimetype` stored first,
/// then the manifest and `content.xml`.
pub struct OdsReport;

/// The same single-sheet document as one flat XML file (`.fods`).
pub struct FlatOdsReport;

impl ReportRenderer for OdsReport {
    fn render(&self, table: &Table) -> Result<Vec<u8>> {
        let content = spreadsheet_xml(table, "office:document-content", &[])?;

        let mut package = ZipWriter::new(Cursor::new(Vec::new()));
        package
            .start_file("mimetype", entry_options(CompressionMethod::Stored))
            .map_err(export_error)?;
        package.write_all(ODS_MIMETYPE.as_bytes()).map_err(export_error)?;
        package
            .start_file("META-INF/manifest.xml", entry_options(CompressionMethod::Deflated))
            .map_err(export_error)?;
        package.write_all(MANIFEST.as_bytes()).map_err(export_error)?;
        package
            .start_file("content.xml", entry_options(CompressionMethod::Deflated))
            .map_err(export_error)?;
        package.write_all(&content).map_err(export_error)?;

        Ok(package.finish().map_err(export_error)?.into_inner())
    }
}

impl ReportRenderer for FlatOdsReport {
    fn render(&self, table: &Table) -> Result<Vec<u8>> {
        spreadsheet_xml(table, "office:document", &[("office:mimetype", ODS_MIMETYPE)])
    }
}

// Fixed timestamps keep the package byte-for-byte reproducible.
fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
}

fn spreadsheet_xml(table: &Table, root: &str, extra: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(export_error)?;

    let document = BytesStart::new(root)
        .with_attributes(NAMESPACES)
        .with_attributes([("office:version", "1.2")])
        .with_attributes(extra.iter().copied());
    writer.write_event(Event::Start(document)).map_err(export_error)?;
    for tag in ["office:body", "office:spreadsheet"] {
        writer
            .write_event(Event::Start(BytesStart::new(tag)))
            .map_err(export_error)?;
    }
    let sheet = BytesStart::new("table:table").with_attributes([("table:name", SHEET_NAME)]);
    writer.write_event(Event::Start(sheet)).map_err(export_error)?;

    write_row(&mut writer, &table.headers)?;
    for row in &table.rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        write_row(&mut writer, &cells)?;
    }

    for tag in ["table:table", "office:spreadsheet", "office:body", root] {
        writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(export_error)?;
    }
    Ok(writer.into_inner())
}

/// Every cell is written as a string cell.
fn write_row(writer: &mut Writer<Vec<u8>>, cells: &[&str]) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("table:table-row")))
        .map_err(export_error)?;
    for cell in cells {
        let start = BytesStart::new("table:table-cell").with_attributes([("office:value-type", "string")]);
        writer.write_event(Event::Start(start)).map_err(export_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("text:p")))
            .map_err(export_error)?;
        writer
            .write_event(Event::Text(BytesText::new(&xml_text(cell))))
            .map_err(export_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("text:p")))
            .map_err(export_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("table:table-cell")))
            .map_err(export_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("table:table-row")))
        .map_err(export_error)?;
    Ok(())
}

/// Drops characters XML 1.0 cannot carry, even escaped.
fn xml_text(cell: &str) -> Cow<'_, str> {
    if cell.chars().all(is_xml_char) {
        Cow::Borrowed(cell)
    } else {
        Cow::Owned(cell.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}
