//! Landing store for the bronze pipeline.
//!
//! The pipeline core talks to the analytical store only through
//! [`LandingStore`] / [`LandingConnection`]. [`DuckDbStore`] is the production
//! implementation.
//!
//! ```rust,ignore
//! use bronze_store::{DuckDbStore, LandingStore};
//!
//! let store = DuckDbStore::open("data/bronze.duckdb")?;
//! let conn = store.connect()?;
//! conn.ensure_schema("bronze")?;
//! let rows = conn.count_rows("bronze", "customers")?;
//! ```

mod backend;
mod error;
pub mod lock;
pub mod sql;
mod value;

pub use backend::{AccessMode, DuckDbConnection, DuckDbStore};
pub use error::{Result, StoreError};
pub use lock::{try_lock_exclusive, LockError, StoreLockGuard};
pub use value::{parse_bool, parse_timestamp, ColumnDef, ColumnType, ResultSet, Value};

/// Prefix of transient staging tables. Never a valid landing table name.
pub const STAGING_PREFIX: &str = "__bronze_stage_";

/// Unique staging table name for one load of `table`.
pub fn staging_table_name(table: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", STAGING_PREFIX, table, &suffix[..12])
}

/// Handle to an analytical store. Hands out one connection per task.
pub trait LandingStore: Send + Sync {
    /// Acquire a connection. It is released when dropped.
    fn connect(&self) -> Result<Box<dyn LandingConnection>>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// The narrow contract the pipeline needs from the analytical store.
///
/// `schema` is the landing namespace; table names are unqualified.
pub trait LandingConnection: Send {
    /// Execute a statement, returning affected rows.
    fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a query and return the full result set.
    fn query(&self, sql: &str) -> Result<ResultSet>;

    fn ensure_schema(&self, schema: &str) -> Result<()>;

    /// Landing tables in `schema`, excluding staging tables.
    fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    fn table_exists(&self, schema: &str, name: &str) -> Result<bool>;

    /// Current columns of a table in ordinal order; empty if it does not exist.
    fn describe_table(&self, schema: &str, name: &str) -> Result<Vec<ColumnDef>>;

    fn create_table(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> Result<()>;

    /// Append nullable columns to an existing table.
    fn add_columns(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> Result<()>;

    /// Insert rows whose values are ordered like `columns`.
    fn insert_rows(
        &self,
        schema: &str,
        name: &str,
        columns: &[ColumnDef],
        rows: &[Vec<Value>],
    ) -> Result<u64>;

    /// Atomically replace `final_name` with `staging` (the staging name disappears).
    fn swap_table(&self, schema: &str, staging: &str, final_name: &str) -> Result<()>;

    fn count_rows(&self, schema: &str, name: &str) -> Result<u64>;

    fn drop_table(&self, schema: &str, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_names_are_unique_and_prefixed() {
        let a = staging_table_name("customers");
        let b = staging_table_name("customers");
        assert!(a.starts_with("__bronze_stage_customers_"));
        assert_ne!(a, b);
    }
}
