//! Error types for the landing store.

use thiserror::Error;

use crate::lock::LockError;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from landing store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Landing store is locked by another process: {0}")]
    Locked(String),

    #[error("Operation requires write access but the landing store is read-only")]
    ReadOnly,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

impl StoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }
}

impl From<LockError> for StoreError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Locked(path) => StoreError::Locked(path.display().to_string()),
            LockError::CreateFailed(io) => StoreError::Database(format!("Lock file error: {}", io)),
            LockError::AcquireFailed(io) => {
                StoreError::Database(format!("Lock acquire error: {}", io))
            }
        }
    }
}
