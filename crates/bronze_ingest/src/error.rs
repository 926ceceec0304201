//! Error taxonomy for the ingestion pipeline.
//!
//! Every per-source failure ends up as one of these variants inside a
//! [`RunOutcome`](crate::RunOutcome); only [`IngestError::OrchestratorInit`] aborts a run.

use bronze_store::{ColumnType, StoreError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Connection could not be established, the query could not be issued, or the file could not be opened.
    #[error("Source '{source_id}' unavailable: {message}")]
    SourceUnavailable { source_id: String, message: String },

    /// Reading began but a row or value could not be parsed.
    #[error("Source '{source_id}' read error: {message}")]
    SourceRead { source_id: String, message: String },

    #[error(
        "Schema conflict on {table}.{column}: batch type {batch_type} cannot load into table type {table_type} (value {value})"
    )]
    SchemaConflict {
        table: String,
        column: String,
        table_type: ColumnType,
        batch_type: ColumnType,
        value: String,
    },

    #[error("Write to landing table '{table}' failed: {message}")]
    Write { table: String, message: String },

    #[error("Load verification failed for '{table}': expected {expected} rows, store reports {actual}")]
    LoadVerificationFailed {
        table: String,
        expected: u64,
        actual: u64,
    },

    #[error("Orchestrator initialization failed: {0}")]
    OrchestratorInit(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Source task panicked: {0}")]
    TaskPanicked(String),
}

impl IngestError {
    pub fn unavailable(source_id: &str, message: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.to_string(),
            message: message.to_string(),
        }
    }

    pub fn read(source_id: &str, message: impl fmt::Display) -> Self {
        Self::SourceRead {
            source_id: source_id.to_string(),
            message: message.to_string(),
        }
    }

    pub fn write(table: &str, err: StoreError) -> Self {
        Self::Write {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    pub fn init(message: impl Into<String>) -> Self {
        Self::OrchestratorInit(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            IngestError::SourceRead { .. } => ErrorKind::SourceReadError,
            IngestError::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            IngestError::Write { .. } => ErrorKind::WriteError,
            IngestError::LoadVerificationFailed { .. } => ErrorKind::LoadVerificationFailed,
            IngestError::OrchestratorInit(_) => ErrorKind::OrchestratorInitError,
            IngestError::Cancelled(_) => ErrorKind::Cancelled,
            IngestError::TaskPanicked(_) => ErrorKind::TaskPanicked,
        }
    }
}

/// Stable, machine-readable failure category recorded in outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    SourceReadError,
    SchemaConflict,
    WriteError,
    LoadVerificationFailed,
    OrchestratorInitError,
    Cancelled,
    TaskPanicked,
    /// The run ended without the source ever being processed.
    NotAttempted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::SourceReadError => "source_read_error",
            ErrorKind::SchemaConflict => "schema_conflict",
            ErrorKind::WriteError => "write_error",
            ErrorKind::LoadVerificationFailed => "load_verification_failed",
            ErrorKind::OrchestratorInitError => "orchestrator_init_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::TaskPanicked => "task_panicked",
            ErrorKind::NotAttempted => "not_attempted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_serde() {
        let kinds = [
            ErrorKind::SourceUnavailable,
            ErrorKind::SourceReadError,
            ErrorKind::SchemaConflict,
            ErrorKind::WriteError,
            ErrorKind::LoadVerificationFailed,
            ErrorKind::OrchestratorInitError,
            ErrorKind::Cancelled,
            ErrorKind::TaskPanicked,
            ErrorKind::NotAttempted,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_schema_conflict_message_names_table_column_and_types() {
        let err = IngestError::SchemaConflict {
            table: "customers".into(),
            column: "age".into(),
            table_type: ColumnType::Integer,
            batch_type: ColumnType::Text,
            value: "'old'".into(),
        };
        let message = err.to_string();
        assert!(message.contains("customers.age"));
        assert!(message.contains("text"));
        assert!(message.contains("integer"));
        assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    }
}
