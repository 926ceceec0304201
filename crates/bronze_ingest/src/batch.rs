//! In-memory batch: the full contents of one source at one point in time.

use bronze_store::{ColumnDef, Value};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::source::SourceKind;

/// Structural problems rejected by [`Batch::new`].
#[derive(Debug, Error, PartialEq)]
pub enum BatchError {
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Row {row} has {actual} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Rows are positionally aligned with `columns`; every row has exactly one value per column.
#[derive(Debug, Clone)]
pub struct Batch {
    source_id: String,
    kind: SourceKind,
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Value>>,
    extracted_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(
        source_id: impl Into<String>,
        kind: SourceKind,
        columns: Vec<ColumnDef>,
        rows: Vec<Vec<Value>>,
        extracted_at: DateTime<Utc>,
    ) -> Result<Self, BatchError> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|prev| prev.same_name(&column.name)) {
                return Err(BatchError::DuplicateColumn(column.name.clone()));
            }
        }
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(BatchError::RowWidth {
                row,
                expected: columns.len(),
                actual: values.len(),
            });
        }
        Ok(Self::from_checked_parts(
            source_id.into(),
            kind,
            columns,
            rows,
            extracted_at,
        ))
    }

    /// Caller guarantees unique names and row widths.
    pub(crate) fn from_checked_parts(
        source_id: String,
        kind: SourceKind,
        columns: Vec<ColumnDef>,
        rows: Vec<Vec<Value>>,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id,
            kind,
            columns,
            rows,
            extracted_at,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.same_name(name))
    }

    /// Name-based view of a single cell.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|values| values.get(index))
    }

    pub fn into_parts(self) -> (String, SourceKind, Vec<ColumnDef>, Vec<Vec<Value>>, DateTime<Utc>) {
        (
            self.source_id,
            self.kind,
            self.columns,
            self.rows,
            self.extracted_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bronze_store::ColumnType;

    fn id_name() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("name", ColumnType::Text),
        ]
    }

    #[test]
    fn test_rejects_short_rows() {
        let err = Batch::new(
            "customers",
            SourceKind::Database,
            id_name(),
            vec![vec![Value::from(1_i64)]],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            BatchError::RowWidth {
                row: 0,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_rejects_case_insensitive_duplicate_names() {
        let columns = vec![
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("ID", ColumnType::Text),
        ];
        let err = Batch::new("t", SourceKind::File, columns, Vec::new(), Utc::now()).unwrap_err();
        assert_eq!(err, BatchError::DuplicateColumn("ID".to_string()));
    }

    #[test]
    fn test_name_based_view() {
        let batch = Batch::new(
            "customers",
            SourceKind::Database,
            id_name(),
            vec![
                vec![Value::from(1_i64), Value::from("A")],
                vec![Value::from(2_i64), Value::Null],
            ],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.value(0, "NAME"), Some(&Value::from("A")));
        assert_eq!(batch.value(1, "name"), Some(&Value::Null));
        assert_eq!(batch.value(0, "missing"), None);
    }
}
