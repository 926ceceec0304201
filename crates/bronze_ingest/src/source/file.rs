//! Delimited text files with a header row.

use bronze_store::{parse_bool, parse_timestamp, ColumnDef, ColumnType, Value};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;

use super::{SourceDescriptor, SourceKind};
use crate::batch::Batch;
use crate::error::{IngestError, Result};

#[derive(Debug, Default, Clone)]
pub struct FileReader;

impl FileReader {
    pub async fn read_all(&self, source: &SourceDescriptor) -> Result<Batch> {
        let extracted_at = Utc::now();
        let owned = source.clone();
        tokio::task::spawn_blocking(move || read_delimited(&owned, extracted_at))
            .await
            .map_err(|e| IngestError::read(&source.id, format!("file reader task failed: {}", e)))?
    }
}

fn read_delimited(source: &SourceDescriptor, extracted_at: DateTime<Utc>) -> Result<Batch> {
    let path = Path::new(&source.location);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(source.delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| {
            IngestError::unavailable(&source.id, format!("cannot open {}: {}", path.display(), e))
        })?;

    let headers = reader
        .headers()
        .map_err(|e| IngestError::read(&source.id, format!("invalid header row: {}", e)))?
        .clone();
    if headers.is_empty() {
        return Err(IngestError::read(&source.id, "missing header row"));
    }
    let mut names = Vec::with_capacity(headers.len());
    for (position, header) in headers.iter().enumerate() {
        let name = header.trim();
        if name.is_empty() {
            return Err(IngestError::read(
                &source.id,
                format!("empty column name at position {}", position + 1),
            ));
        }
        names.push(name.to_string());
    }

    let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
    for (index, record) in reader.records().enumerate() {
        // Header is line 1.
        let record = record
            .map_err(|e| IngestError::read(&source.id, format!("line {}: {}", index + 2, e)))?;
        raw_rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect(),
        );
    }

    let columns: Vec<ColumnDef> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let column_type = if has_timestamp_hint(name, &source.timestamp_hints) {
                ColumnType::Timestamp
            } else {
                infer_column_type(raw_rows.iter().filter_map(|row| row[i].as_deref()))
            };
            ColumnDef::new(name.clone(), column_type)
        })
        .collect();

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (index, raw) in raw_rows.into_iter().enumerate() {
        let mut values = Vec::with_capacity(columns.len());
        for (column, cell) in columns.iter().zip(raw) {
            let value = match cell {
                None => Value::Null,
                Some(text) => convert_cell(&text, column.column_type).ok_or_else(|| {
                    IngestError::read(
                        &source.id,
                        format!(
                            "line {}: cannot parse '{}' in column '{}' as {}",
                            index + 2,
                            text,
                            column.name,
                            column.column_type
                        ),
                    )
                })?,
            };
            values.push(value);
        }
        rows.push(values);
    }

    debug!(
        source = %source.id,
        rows = rows.len(),
        columns = columns.len(),
        "Read delimited file {}",
        path.display()
    );

    Batch::new(source.id.clone(), SourceKind::File, columns, rows, extracted_at)
        .map_err(|e| IngestError::read(&source.id, e))
}

/// A hint matches whole words of the column name, so `date` tags `signup_date`
/// and `SignupDate` but not `candidate_id` or `updated_by`.
fn has_timestamp_hint(name: &str, hints: &[String]) -> bool {
    let words = name_words(name);
    hints.iter().any(|hint| {
        let hint_words = name_words(hint);
        !hint_words.is_empty()
            && words
                .windows(hint_words.len())
                .any(|window| window == hint_words.as_slice())
    })
}

/// Lowercased words split on separators and lower-to-upper case changes.
fn name_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Narrowest type every value parses as: Integer, then Float, then Boolean, else Text.
///
/// A column with no values is Text.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a str>) -> ColumnType {
    let mut seen = false;
    let mut integer = true;
    let mut float = true;
    let mut boolean = true;
    for raw in values {
        seen = true;
        let value = raw.trim();
        integer = integer && value.parse::<i64>().is_ok();
        float = float && value.parse::<f64>().is_ok();
        boolean = boolean && parse_bool(value).is_some();
        if !integer && !float && !boolean {
            return ColumnType::Text;
        }
    }
    match (seen, integer, float, boolean) {
        (false, ..) => ColumnType::Text,
        (true, true, ..) => ColumnType::Integer,
        (true, false, true, _) => ColumnType::Float,
        (true, false, false, true) => ColumnType::Boolean,
        _ => ColumnType::Text,
    }
}

fn convert_cell(text: &str, column_type: ColumnType) -> Option<Value> {
    let trimmed = text.trim();
    match column_type {
        ColumnType::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
        ColumnType::Float => trimmed.parse::<f64>().ok().map(Value::Float),
        ColumnType::Boolean => parse_bool(trimmed).map(Value::Boolean),
        ColumnType::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
        ColumnType::Text => Some(Value::Text(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn descriptor(file: &NamedTempFile) -> SourceDescriptor {
        SourceDescriptor::file("user_events", file.path().display().to_string())
    }

    #[test]
    fn test_infer_column_type() {
        assert_eq!(infer_column_type(["1", "2", "-3"]), ColumnType::Integer);
        assert_eq!(infer_column_type(["1", "2.5"]), ColumnType::Float);
        assert_eq!(infer_column_type(["true", "FALSE"]), ColumnType::Boolean);
        assert_eq!(infer_column_type(["1", "true"]), ColumnType::Text);
        assert_eq!(infer_column_type(["abc"]), ColumnType::Text);
        assert_eq!(infer_column_type(Vec::<&str>::new()), ColumnType::Text);
    }

    #[test]
    fn test_timestamp_hint_matches_whole_words() {
        let hints = vec!["timestamp".to_string(), "date".to_string()];
        assert!(has_timestamp_hint("event_timestamp", &hints));
        assert!(has_timestamp_hint("SignupDate", &hints));
        assert!(has_timestamp_hint("DATE", &hints));
        assert!(!has_timestamp_hint("user_id", &hints));
        assert!(!has_timestamp_hint("candidate_id", &hints));
        assert!(!has_timestamp_hint("updated_by", &hints));

        let multi = vec!["seen_at".to_string()];
        assert!(has_timestamp_hint("last_seen_at", &multi));
        assert!(!has_timestamp_hint("seen", &multi));
    }

    #[tokio::test]
    async fn test_columns_containing_hint_text_keep_inferred_types() {
        let file = csv_file("candidate_id,updated_by\n7,alice\n");
        let batch = FileReader.read_all(&descriptor(&file)).await.unwrap();
        assert_eq!(
            batch.columns(),
            &[
                ColumnDef::new("candidate_id", ColumnType::Integer),
                ColumnDef::new("updated_by", ColumnType::Text),
            ]
        );
    }

    #[tokio::test]
    async fn test_reads_typed_columns_and_nulls() {
        let file = csv_file(
            "user_id,event,amount,event_timestamp,active\n\
             1,login,2.5,2024-03-01 12:30:00,true\n\
             2,,,2024-03-02,false\n",
        );
        let batch = FileReader.read_all(&descriptor(&file)).await.unwrap();

        assert_eq!(batch.kind(), SourceKind::File);
        assert_eq!(
            batch.columns(),
            &[
                ColumnDef::new("user_id", ColumnType::Integer),
                ColumnDef::new("event", ColumnType::Text),
                ColumnDef::new("amount", ColumnType::Float),
                ColumnDef::new("event_timestamp", ColumnType::Timestamp),
                ColumnDef::new("active", ColumnType::Boolean),
            ]
        );
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.value(1, "event"), Some(&Value::Null));
        assert_eq!(batch.value(1, "amount"), Some(&Value::Null));
        assert_eq!(
            batch.value(0, "event_timestamp"),
            Some(&Value::Timestamp(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
            ))
        );
    }

    #[tokio::test]
    async fn test_header_only_file_yields_empty_batch() {
        let file = csv_file("id,name\n");
        let batch = FileReader.read_all(&descriptor(&file)).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.columns().len(), 2);
        assert_eq!(batch.columns()[0].column_type, ColumnType::Text);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let source = SourceDescriptor::file("ghost", "/nonexistent/dir/ghost.csv");
        let err = FileReader.read_all(&source).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }

    #[tokio::test]
    async fn test_ragged_row_is_read_error() {
        let file = csv_file("id,name\n1,A\n2\n");
        let err = FileReader.read_all(&descriptor(&file)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceReadError);
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_read_error() {
        let file = csv_file("id,created_date\n1,not-a-date\n");
        let err = FileReader.read_all(&descriptor(&file)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceReadError);
        assert!(err.to_string().contains("created_date"));
    }

    #[tokio::test]
    async fn test_custom_delimiter_and_hints() {
        let file = csv_file("id;seen_at\n1;2024-01-01T00:00:00Z\n");
        let source = descriptor(&file)
            .with_delimiter(b';')
            .with_timestamp_hints(["seen_at"]);
        let batch = FileReader.read_all(&source).await.unwrap();
        assert_eq!(batch.columns()[1].column_type, ColumnType::Timestamp);
    }
}
