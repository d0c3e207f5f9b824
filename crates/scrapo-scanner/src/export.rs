//! CSV rendering of accumulated datasets and delivery of the file.

use crate::error::{Result, ScanError};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use scrapo_core::{Field, Record, Row};
use std::path::PathBuf;

/// MIME type of exported datasets.
pub const CSV_MIME: &str = "text/csv";

/// Columns that at least one record has a value for, in canonical order.
#[must_use]
pub fn present_columns(records: &[Record]) -> Vec<Field> {
    Field::ALL
        .iter()
        .copied()
        .filter(|field| records.iter().any(|r| r.contains(*field)))
        .collect()
}

/// Render records with a header of their present columns.
///
/// Missing fields render as empty cells. No records renders as an empty string.
pub fn records_to_csv(records: &[Record]) -> Result<String> {
    if records.is_empty() {
        return Ok(String::new());
    }

    let columns = present_columns(records);
    let mut writer = csv_writer();
    writer.write_record(columns.iter().map(|f| f.column_name()))?;
    for record in records {
        writer.write_record(columns.iter().map(|f| record.get(*f).unwrap_or("")))?;
    }
    finish(writer)
}

/// Render rows verbatim, header row included.
pub fn rows_to_csv(rows: &[Row]) -> Result<String> {
    let mut writer = csv_writer();
    for row in rows {
        writer.write_record(row)?;
    }
    finish(writer)
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .flexible(true)
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ScanError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ScanError::Export(e.to_string()))
}

/// Destination for a rendered file.
#[async_trait::async_trait]
pub trait DownloadSink: Send + Sync {
    /// Deliver `bytes` under `filename`. Returns where the file went.
    async fn deliver(&self, filename: &str, mime: &str, bytes: &[u8]) -> Result<String>;
}

/// Writes downloads into a directory, replacing any file of the same name.
#[derive(Debug, Clone)]
pub struct FileDownloadSink {
    dir: PathBuf,
}

impl FileDownloadSink {
    /// Sink writing into `dir`, created on first delivery.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Full path a file named `filename` is written to.
    #[must_use]
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

#[async_trait::async_trait]
impl DownloadSink for FileDownloadSink {
    async fn deliver(&self, filename: &str, mime: &str, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(filename);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), mime, bytes = bytes.len(), "Wrote download");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(Field, &str)]) -> Record {
        fields.iter().map(|(f, v)| (*f, *v)).collect()
    }

    #[test]
    fn test_empty_records_render_nothing() {
        assert_eq!(records_to_csv(&[]).unwrap(), "");
        assert_eq!(rows_to_csv(&[]).unwrap(), "");
    }

    #[test]
    fn test_columns_are_pruned_and_ordered() {
        let records = vec![
            record(&[(Field::About, "Robots"), (Field::Name, "Acme")]),
            record(&[(Field::Location, "Berlin")]),
        ];
        assert_eq!(
            present_columns(&records),
            vec![Field::Name, Field::Location, Field::About]
        );

        let csv = records_to_csv(&records).unwrap();
        assert_eq!(
            csv,
            "\"Name\",\"Location\",\"About\"\r\n\"Acme\",\"\",\"Robots\"\r\n\"\",\"Berlin\",\"\"\r\n"
        );
    }

    #[test]
    fn test_url_columns_use_display_names() {
        let records = vec![record(&[
            (Field::ProfileUrl, "https://www.linkedin.com/a"),
            (Field::OrganizationUrl, "https://www.linkedin.com/b"),
        ])];
        let csv = records_to_csv(&records).unwrap();
        assert!(csv.starts_with("\"ProfileURL\",\"OrganizationURL\"\r\n"));
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        let rows = vec![
            vec!["Name".to_string()],
            vec![r#"Jane "JD" Doe"#.to_string()],
        ];
        let csv = rows_to_csv(&rows).unwrap();
        assert_eq!(csv, "\"Name\"\r\n\"Jane \"\"JD\"\" Doe\"\r\n");

        let parsed: Vec<Vec<String>> = csv::Reader::from_reader(csv.as_bytes())
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        assert_eq!(parsed, vec![vec![r#"Jane "JD" Doe"#.to_string()]]);
    }

    #[test]
    fn test_ragged_rows_are_written() {
        let rows = vec![
            vec!["Name".to_string(), "Title".to_string()],
            vec!["Name".to_string()],
        ];
        let csv = rows_to_csv(&rows).unwrap();
        assert_eq!(csv, "\"Name\",\"Title\"\r\n\"Name\"\r\n");
    }

    #[test]
    fn test_record_round_trip_keeps_values() {
        let records = vec![
            record(&[(Field::Name, "Acme, Inc."), (Field::About, "Line one\nline two")]),
            record(&[(Field::Name, "Globex"), (Field::Employees, "11-50")]),
        ];
        let csv = records_to_csv(&records).unwrap();

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        let parsed: Vec<Record> = reader
            .records()
            .map(|row| {
                let row = row.unwrap();
                header
                    .iter()
                    .zip(row.iter())
                    .map(|(column, value)| (column.parse::<Field>().unwrap(), value))
                    .collect()
            })
            .collect();
        assert_eq!(parsed, records);
    }

    #[tokio::test]
    async fn test_file_sink_writes_into_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = FileDownloadSink::new(dir.path().join("exports"));

        let location = sink
            .deliver("linkedin_leads_data.csv", CSV_MIME, b"\"Name\"\r\n")
            .await
            .unwrap();

        let path = dir.path().join("exports").join("linkedin_leads_data.csv");
        assert_eq!(location, path.display().to_string());
        assert_eq!(std::fs::read(path).unwrap(), b"\"Name\"\r\n");
    }
}
