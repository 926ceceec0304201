//! Source read contract and the default database/file readers.

mod database;
mod file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::batch::Batch;
use crate::error::Result;

pub use database::DatabaseReader;
pub use file::{infer_column_type, FileReader};

/// Column-name fragments that mark a delimited-file column as a timestamp.
pub const DEFAULT_TIMESTAMP_HINTS: &[&str] = &["timestamp", "date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Database,
    File,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Database => "database",
            SourceKind::File => "file",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to read one source.
///
/// `id` doubles as the landing table name.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: String,
    pub kind: SourceKind,
    /// Database URL (`postgres://`, `sqlite:`) or file path.
    pub location: String,
    /// Source table for database sources; defaults to `id`.
    pub table: Option<String>,
    pub delimiter: u8,
    pub timestamp_hints: Vec<String>,
}

impl SourceDescriptor {
    pub fn database(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id.into(), SourceKind::Database, url.into())
    }

    pub fn file(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id.into(), SourceKind::File, path.into())
    }

    fn new(id: String, kind: SourceKind, location: String) -> Self {
        Self {
            id,
            kind,
            location,
            table: None,
            delimiter: b',',
            timestamp_hints: DEFAULT_TIMESTAMP_HINTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_timestamp_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timestamp_hints = hints.into_iter().map(Into::into).collect();
        self
    }

    /// Table read from a database source.
    pub fn source_table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.id)
    }

    /// Provenance tag stamped on every row: `<kind>.<id>`.
    pub fn tag(&self) -> String {
        format!("{}.{}", self.kind, self.id)
    }
}

/// Reads the full current contents of one source.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn read_all(&self, source: &SourceDescriptor) -> Result<Batch>;
}

/// Dispatches on [`SourceKind`].
#[derive(Debug, Default, Clone)]
pub struct DefaultSourceReader {
    database: DatabaseReader,
    file: FileReader,
}

impl DefaultSourceReader {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceReader for DefaultSourceReader {
    async fn read_all(&self, source: &SourceDescriptor) -> Result<Batch> {
        match source.kind {
            SourceKind::Database => self.database.read_all(source).await,
            SourceKind::File => self.file.read_all(source).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let source = SourceDescriptor::database("customers", "sqlite:ops.db");
        assert_eq!(source.source_table(), "customers");
        assert_eq!(source.tag(), "database.customers");
        assert_eq!(source.delimiter, b',');
        assert_eq!(source.timestamp_hints, vec!["timestamp", "date"]);

        let source = SourceDescriptor::database("customers", "sqlite:ops.db")
            .with_table("public.customers");
        assert_eq!(source.source_table(), "public.customers");

        let file = SourceDescriptor::file("user_events", "raw/user_events.csv");
        assert_eq!(file.tag(), "file.user_events");
    }
}
