//! DuckDB landing store.
//!
//! - Columnar, OLAP-optimized
//! - Single-writer enforced via file lock
//! - One root connection per store; every task works on its own clone

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug_span, info};

use crate::error::{Result, StoreError};
use crate::lock::{try_lock_exclusive, StoreLockGuard};
use crate::sql::{hash_sql, qualified, quote_ident, sql_op_name};
use crate::value::{ColumnDef, ColumnType, ResultSet, Value};
use crate::{LandingConnection, LandingStore, STAGING_PREFIX};

/// Store access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-write access (holds the exclusive file lock for file-backed stores)
    ReadWrite,
    /// Read-only access (can coexist with other readers)
    ReadOnly,
}

/// DuckDB-backed landing store.
pub struct DuckDbStore {
    root: Mutex<duckdb::Connection>,
    location: String,
    access_mode: AccessMode,
    /// Dropping the store releases the exclusive file lock.
    _lock_guard: Option<StoreLockGuard>,
}

impl std::fmt::Debug for DuckDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbStore")
            .field("location", &self.location)
            .field("access_mode", &self.access_mode)
            .finish()
    }
}

impl DuckDbStore {
    /// Open (or create) a file-backed store for writing.
    ///
    /// Acquires the exclusive process lock first; fails with
    /// [`StoreError::Locked`] if another process holds it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_guard = try_lock_exclusive(path)?;
        let conn = duckdb::Connection::open(path)?;
        info!("Opened landing store with exclusive lock: {}", path.display());

        Ok(Self {
            root: Mutex::new(conn),
            location: path.display().to_string(),
            access_mode: AccessMode::ReadWrite,
            _lock_guard: Some(lock_guard),
        })
    }

    /// Open an existing store read-only (no lock required).
    pub fn open_readonly(path: impl AsRef<Path>) -> Result<Self> {
        use duckdb::{AccessMode as DuckAccessMode, Config};

        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::Database(format!(
                "Landing store not found: {}",
                path.display()
            )));
        }
        let config = Config::default().access_mode(DuckAccessMode::ReadOnly)?;
        let conn = duckdb::Connection::open_with_flags(path, config)?;
        info!("Opened landing store (read-only): {}", path.display());

        Ok(Self {
            root: Mutex::new(conn),
            location: path.display().to_string(),
            access_mode: AccessMode::ReadOnly,
            _lock_guard: None,
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = duckdb::Connection::open_in_memory()?;
        info!("Opened in-memory landing store");

        Ok(Self {
            root: Mutex::new(conn),
            location: ":memory:".to_string(),
            access_mode: AccessMode::ReadWrite,
            _lock_guard: None,
        })
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Typed connection, for callers that do not need the trait object.
    pub fn connection(&self) -> Result<DuckDbConnection> {
        let root = self
            .root
            .lock()
            .map_err(|_| StoreError::Database("landing store root connection poisoned".into()))?;
        let conn = root.try_clone()?;
        Ok(DuckDbConnection {
            conn,
            access_mode: self.access_mode,
        })
    }

    /// Lock file path for a file-backed store.
    pub fn lock_path(&self) -> Option<PathBuf> {
        self._lock_guard
            .as_ref()
            .map(|guard| guard.lock_path().to_path_buf())
    }
}

impl LandingStore for DuckDbStore {
    fn connect(&self) -> Result<Box<dyn LandingConnection>> {
        Ok(Box::new(self.connection()?))
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

/// One task's connection to the landing store.
pub struct DuckDbConnection {
    conn: duckdb::Connection,
    access_mode: AccessMode,
}

impl std::fmt::Debug for DuckDbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbConnection")
            .field("access_mode", &self.access_mode)
            .finish()
    }
}

impl DuckDbConnection {
    fn ensure_writable(&self) -> Result<()> {
        if self.access_mode == AccessMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Run `op` inside BEGIN/COMMIT, rolling back on error.
    fn transaction<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&duckdb::Connection) -> Result<T>,
    {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match op(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => match self.conn.execute_batch("ROLLBACK") {
                Ok(()) => Err(err),
                Err(rollback_err) => Err(StoreError::Transaction(format!(
                    "Transaction failed: {}; rollback failed: {}",
                    err, rollback_err
                ))),
            },
        }
    }

    fn execute_on(conn: &duckdb::Connection, sql: &str, params: &[Value]) -> Result<u64> {
        let op = sql_op_name(sql);
        let sql_hash = hash_sql(sql);
        let span = debug_span!(
            "store.exec",
            op = op,
            sql_hash = %sql_hash,
            duration_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut stmt = conn.prepare(sql)?;
        let duckdb_params = to_duckdb_params(params);
        let param_refs: Vec<&dyn duckdb::ToSql> = duckdb_params
            .iter()
            .map(|v| v as &dyn duckdb::ToSql)
            .collect();
        let rows = stmt.execute(param_refs.as_slice())?;
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(rows as u64)
    }

    fn query_on(conn: &duckdb::Connection, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let op = sql_op_name(sql);
        let sql_hash = hash_sql(sql);
        let span = debug_span!(
            "store.query",
            op = op,
            sql_hash = %sql_hash,
            duration_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut stmt = conn.prepare(sql)?;
        let duckdb_params = to_duckdb_params(params);
        let param_refs: Vec<&dyn duckdb::ToSql> = duckdb_params
            .iter()
            .map(|v| v as &dyn duckdb::ToSql)
            .collect();

        let mut rows_iter = stmt.query(param_refs.as_slice())?;

        let (column_count, columns) = if let Some(stmt_ref) = rows_iter.as_ref() {
            let count = stmt_ref.column_count();
            let cols: Vec<String> = (0..count)
                .map(|i| {
                    stmt_ref
                        .column_name(i)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|_| format!("col{}", i))
                })
                .collect();
            (count, cols)
        } else {
            return Ok(ResultSet::default());
        };

        let mut result = ResultSet {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows_iter.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(duckdb_value_to_value(row, i)?);
            }
            result.rows.push(values);
        }

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(result)
    }

    fn scalar_u64(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let result = Self::query_on(&self.conn, sql, params)?;
        let value = result
            .rows
            .first()
            .and_then(|row| row.first())
            .ok_or_else(|| StoreError::query("Expected one row, got none"))?;
        match value {
            Value::Integer(v) => u64::try_from(*v)
                .map_err(|_| StoreError::TypeConversion(format!("Negative count: {}", v))),
            other => Err(StoreError::TypeConversion(format!(
                "Expected integer, got {:?}",
                other
            ))),
        }
    }
}

impl LandingConnection for DuckDbConnection {
    fn execute(&self, sql: &str) -> Result<u64> {
        self.ensure_writable()?;
        Self::execute_on(&self.conn, sql, &[])
    }

    fn query(&self, sql: &str) -> Result<ResultSet> {
        Self::query_on(&self.conn, sql, &[])
    }

    fn ensure_schema(&self, schema: &str) -> Result<()> {
        self.ensure_writable()?;
        Self::execute_on(
            &self.conn,
            &format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)),
            &[],
        )?;
        Ok(())
    }

    fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let result = Self::query_on(
            &self.conn,
            "SELECT table_name FROM information_schema.tables \
             WHERE lower(table_schema) = lower(?) ORDER BY table_name",
            &[Value::from(schema)],
        )?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| match row.into_iter().next() {
                Some(Value::Text(name)) if !name.starts_with(STAGING_PREFIX) => Some(name),
                _ => None,
            })
            .collect())
    }

    fn table_exists(&self, schema: &str, name: &str) -> Result<bool> {
        let count = self.scalar_u64(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?)",
            &[Value::from(schema), Value::from(name)],
        )?;
        Ok(count > 0)
    }

    fn describe_table(&self, schema: &str, name: &str) -> Result<Vec<ColumnDef>> {
        let result = Self::query_on(
            &self.conn,
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?) \
             ORDER BY ordinal_position",
            &[Value::from(schema), Value::from(name)],
        )?;
        result
            .rows
            .into_iter()
            .map(|row| match (row.first(), row.get(1)) {
                (Some(Value::Text(column)), Some(Value::Text(data_type))) => Ok(ColumnDef::new(
                    column.clone(),
                    ColumnType::from_sql_type(data_type),
                )),
                other => Err(StoreError::TypeConversion(format!(
                    "Unexpected information_schema row: {:?}",
                    other
                ))),
            })
            .collect()
    }

    fn create_table(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> Result<()> {
        self.ensure_writable()?;
        if columns.is_empty() {
            return Err(StoreError::invalid_input(format!(
                "Cannot create {}.{} without columns",
                schema, name
            )));
        }
        let column_sql = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("CREATE TABLE {} ({})", qualified(schema, name), column_sql);
        Self::execute_on(&self.conn, &sql, &[])?;
        Ok(())
    }

    fn add_columns(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> Result<()> {
        self.ensure_writable()?;
        if columns.is_empty() {
            return Ok(());
        }
        let target = qualified(schema, name);
        self.transaction(|conn| {
            for column in columns {
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    target,
                    quote_ident(&column.name),
                    column.column_type.sql_type()
                );
                Self::execute_on(conn, &sql, &[])?;
            }
            Ok(())
        })
    }

    fn insert_rows(
        &self,
        schema: &str,
        name: &str,
        columns: &[ColumnDef],
        rows: &[Vec<Value>],
    ) -> Result<u64> {
        self.ensure_writable()?;
        validate_rows(columns, rows)?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.transaction(|conn| bulk_insert_rows(conn, schema, name, columns, rows))
    }

    fn swap_table(&self, schema: &str, staging: &str, final_name: &str) -> Result<()> {
        self.ensure_writable()?;
        let target = qualified(schema, final_name);
        let stage = qualified(schema, staging);
        self.transaction(|conn| {
            Self::execute_on(conn, &format!("DROP TABLE IF EXISTS {}", target), &[])?;
            Self::execute_on(
                conn,
                &format!("ALTER TABLE {} RENAME TO {}", stage, quote_ident(final_name)),
                &[],
            )?;
            Ok(())
        })
    }

    fn count_rows(&self, schema: &str, name: &str) -> Result<u64> {
        self.scalar_u64(
            &format!("SELECT COUNT(*) FROM {}", qualified(schema, name)),
            &[],
        )
    }

    fn drop_table(&self, schema: &str, name: &str) -> Result<()> {
        self.ensure_writable()?;
        Self::execute_on(
            &self.conn,
            &format!("DROP TABLE IF EXISTS {}", qualified(schema, name)),
            &[],
        )?;
        Ok(())
    }
}

const DEFAULT_MAX_PARAMS: usize = 999;

fn validate_rows(columns: &[ColumnDef], rows: &[Vec<Value>]) -> Result<()> {
    if columns.is_empty() {
        return Err(StoreError::invalid_input(
            "insert_rows requires at least one column",
        ));
    }
    for (index, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(StoreError::invalid_input(format!(
                "Row {} has {} values, expected {}",
                index,
                row.len(),
                columns.len()
            )));
        }
    }
    Ok(())
}

fn bulk_insert_rows(
    conn: &duckdb::Connection,
    schema: &str,
    name: &str,
    columns: &[ColumnDef],
    rows: &[Vec<Value>],
) -> Result<u64> {
    let total_params = rows.len().saturating_mul(columns.len());
    if total_params <= DEFAULT_MAX_PARAMS {
        return bulk_insert_rows_generic(conn, schema, name, columns, rows, DEFAULT_MAX_PARAMS);
    }
    bulk_insert_rows_appender(conn, schema, name, rows)
}

/// Appender path for large batches. Row values must follow table column order.
fn bulk_insert_rows_appender(
    conn: &duckdb::Connection,
    schema: &str,
    name: &str,
    rows: &[Vec<Value>],
) -> Result<u64> {
    let mut appender = conn.appender_to_db(name, schema)?;
    for row in rows {
        let duckdb_params = to_duckdb_params(row);
        let param_refs: Vec<&dyn duckdb::ToSql> = duckdb_params
            .iter()
            .map(|v| v as &dyn duckdb::ToSql)
            .collect();
        appender.append_row(param_refs.as_slice())?;
    }
    appender.flush()?;
    Ok(rows.len() as u64)
}

fn bulk_insert_rows_generic(
    conn: &duckdb::Connection,
    schema: &str,
    name: &str,
    columns: &[ColumnDef],
    rows: &[Vec<Value>],
    max_params: usize,
) -> Result<u64> {
    let cols_len = columns.len();
    if cols_len > max_params {
        return Err(StoreError::invalid_input(format!(
            "Too many columns ({}) for max params ({})",
            cols_len, max_params
        )));
    }
    let rows_per_chunk = max_params / cols_len;

    let target = qualified(schema, name);
    let quoted_cols = columns
        .iter()
        .map(|col| quote_ident(&col.name))
        .collect::<Vec<_>>()
        .join(", ");
    let row_clause = format!("({})", vec!["?"; cols_len].join(", "));

    let mut total = 0;
    for chunk in rows.chunks(rows_per_chunk) {
        let values_clause = std::iter::repeat(row_clause.as_str())
            .take(chunk.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            target, quoted_cols, values_clause
        );
        let params: Vec<Value> = chunk.iter().flat_map(|row| row.iter().cloned()).collect();
        DuckDbConnection::execute_on(conn, &sql, &params)?;
        total += chunk.len() as u64;
    }
    Ok(total)
}

fn to_duckdb_params(params: &[Value]) -> Vec<duckdb::types::Value> {
    params
        .iter()
        .map(|p| match p {
            Value::Null => duckdb::types::Value::Null,
            Value::Integer(v) => duckdb::types::Value::BigInt(*v),
            Value::Float(v) => duckdb::types::Value::Double(*v),
            Value::Text(v) => duckdb::types::Value::Text(v.clone()),
            Value::Boolean(v) => duckdb::types::Value::Boolean(*v),
            Value::Timestamp(v) => duckdb::types::Value::Timestamp(
                duckdb::types::TimeUnit::Microsecond,
                v.timestamp_micros(),
            ),
        })
        .collect()
}

/// Microseconds for a DuckDB time value; overflow is a conversion error.
fn micros_from(unit: duckdb::types::TimeUnit, v: i64) -> Result<i64> {
    let micros = match unit {
        duckdb::types::TimeUnit::Second => v.checked_mul(1_000_000),
        duckdb::types::TimeUnit::Millisecond => v.checked_mul(1_000),
        duckdb::types::TimeUnit::Microsecond => Some(v),
        duckdb::types::TimeUnit::Nanosecond => Some(v / 1_000),
    };
    micros.ok_or_else(|| {
        StoreError::TypeConversion(format!("time value {} ({:?}) overflows microseconds", v, unit))
    })
}

/// Date32 counts days since 1970-01-01 (day 719163 of the common era).
fn date_from_days(days: i32) -> Result<Value> {
    let ce_days = days.checked_add(719_163).ok_or_else(|| {
        StoreError::TypeConversion(format!("date offset {} days is out of range", days))
    })?;
    Ok(chrono::NaiveDate::from_num_days_from_ce_opt(ce_days)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Value::Timestamp(naive.and_utc()))
        .unwrap_or(Value::Integer(days as i64)))
}

fn duckdb_value_to_value(row: &duckdb::Row, index: usize) -> Result<Value> {
    use duckdb::types::ValueRef;

    match row.get_ref(index)? {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Boolean(v) => Ok(Value::Boolean(v)),
        ValueRef::TinyInt(v) => Ok(Value::Integer(v as i64)),
        ValueRef::SmallInt(v) => Ok(Value::Integer(v as i64)),
        ValueRef::Int(v) => Ok(Value::Integer(v as i64)),
        ValueRef::BigInt(v) => Ok(Value::Integer(v)),
        ValueRef::HugeInt(v) => Ok(i64::try_from(v)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(v.to_string()))),
        ValueRef::UTinyInt(v) => Ok(Value::Integer(v as i64)),
        ValueRef::USmallInt(v) => Ok(Value::Integer(v as i64)),
        ValueRef::UInt(v) => Ok(Value::Integer(v as i64)),
        ValueRef::UBigInt(v) => Ok(i64::try_from(v)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(v.to_string()))),
        ValueRef::Float(v) => Ok(Value::Float(v as f64)),
        ValueRef::Double(v) => Ok(Value::Float(v)),
        ValueRef::Decimal(d) => {
            let rendered = d.to_string();
            Ok(rendered
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Text(rendered)))
        }
        ValueRef::Text(v) => Ok(Value::Text(String::from_utf8_lossy(v).to_string())),
        ValueRef::Blob(v) => Ok(Value::Text(format!("<{} bytes>", v.len()))),
        ValueRef::Timestamp(unit, v) => {
            let micros = micros_from(unit, v)?;
            Ok(chrono::DateTime::from_timestamp_micros(micros)
                .map(Value::Timestamp)
                .unwrap_or(Value::Integer(micros)))
        }
        ValueRef::Date32(days) => date_from_days(days),
        ValueRef::Time64(unit, v) => {
            let micros = micros_from(unit, v)?;
            let time = u32::try_from(micros / 1_000_000).ok().and_then(|secs| {
                let nanos = u32::try_from((micros % 1_000_000) * 1_000).ok()?;
                chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
            });
            Ok(time
                .map(|time| Value::Text(time.format("%H:%M:%S%.6f").to_string()))
                .unwrap_or(Value::Integer(micros)))
        }
        ValueRef::Interval {
            months,
            days,
            nanos,
        } => Ok(Value::Text(format!("P{}M{}DT{}N", months, days, nanos))),
        other => {
            tracing::warn!(
                "DuckDB type {:?} at column {} mapped to debug string",
                std::mem::discriminant(&other),
                index
            );
            Ok(Value::Text(format!("{:?}", other)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> (DuckDbStore, DuckDbConnection) {
        let store = DuckDbStore::open_in_memory().unwrap();
        let conn = store.connection().unwrap();
        conn.ensure_schema("bronze").unwrap();
        (store, conn)
    }

    fn id_name_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("name", ColumnType::Text),
        ]
    }

    #[test]
    fn insert_rows_inserts_expected_rows() {
        let (_store, conn) = memory_conn();
        conn.create_table("bronze", "t", &id_name_columns()).unwrap();

        let rows = vec![
            vec![Value::from(1_i64), Value::from("alpha")],
            vec![Value::from(2_i64), Value::from("beta")],
        ];
        let inserted = conn
            .insert_rows("bronze", "t", &id_name_columns(), &rows)
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(conn.count_rows("bronze", "t").unwrap(), 2);
    }

    #[test]
    fn insert_rows_rejects_mismatched_row_len() {
        let (_store, conn) = memory_conn();
        conn.create_table("bronze", "t", &id_name_columns()).unwrap();

        let rows = vec![
            vec![Value::from(1_i64)],
            vec![Value::from(2_i64), Value::from("beta")],
        ];
        let err = conn
            .insert_rows("bronze", "t", &id_name_columns(), &rows)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn insert_rows_large_batch_uses_appender() {
        let (_store, conn) = memory_conn();
        conn.create_table("bronze", "big", &id_name_columns()).unwrap();

        let rows: Vec<Vec<Value>> = (0..1_000_i64)
            .map(|i| vec![Value::from(i), Value::from(format!("row-{}", i))])
            .collect();
        let inserted = conn
            .insert_rows("bronze", "big", &id_name_columns(), &rows)
            .unwrap();
        assert_eq!(inserted, 1_000);
        assert_eq!(conn.count_rows("bronze", "big").unwrap(), 1_000);
    }

    #[test]
    fn describe_and_add_columns() {
        let (_store, conn) = memory_conn();
        assert!(!conn.table_exists("bronze", "t").unwrap());
        assert!(conn.describe_table("bronze", "t").unwrap().is_empty());

        conn.create_table("bronze", "t", &id_name_columns()).unwrap();
        assert!(conn.table_exists("bronze", "T").unwrap());

        conn.add_columns(
            "bronze",
            "t",
            &[ColumnDef::new("signed_up", ColumnType::Timestamp)],
        )
        .unwrap();
        let columns = conn.describe_table("bronze", "t").unwrap();
        assert_eq!(
            columns,
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("name", ColumnType::Text),
                ColumnDef::new("signed_up", ColumnType::Timestamp),
            ]
        );
    }

    #[test]
    fn swap_table_replaces_contents_and_hides_staging() {
        let (_store, conn) = memory_conn();
        let columns = id_name_columns();
        conn.create_table("bronze", "t", &columns).unwrap();
        conn.insert_rows(
            "bronze",
            "t",
            &columns,
            &[vec![Value::from(1_i64), Value::from("old")]],
        )
        .unwrap();

        let staging = crate::staging_table_name("t");
        conn.create_table("bronze", &staging, &columns).unwrap();
        conn.insert_rows(
            "bronze",
            &staging,
            &columns,
            &[
                vec![Value::from(2_i64), Value::from("new")],
                vec![Value::from(3_i64), Value::from("newer")],
            ],
        )
        .unwrap();
        assert_eq!(conn.list_tables("bronze").unwrap(), vec!["t".to_string()]);

        conn.swap_table("bronze", &staging, "t").unwrap();

        assert_eq!(conn.count_rows("bronze", "t").unwrap(), 2);
        assert!(!conn.table_exists("bronze", &staging).unwrap());
        let result = conn
            .query("SELECT id, name FROM bronze.t ORDER BY id")
            .unwrap();
        assert_eq!(result.get(0, "name"), Some(&Value::from("new")));
    }

    #[test]
    fn query_round_trips_scalar_types() {
        let (_store, conn) = memory_conn();
        let ts = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let columns = vec![
            ColumnDef::new("i", ColumnType::Integer),
            ColumnDef::new("f", ColumnType::Float),
            ColumnDef::new("b", ColumnType::Boolean),
            ColumnDef::new("ts", ColumnType::Timestamp),
            ColumnDef::new("s", ColumnType::Text),
        ];
        conn.create_table("bronze", "types", &columns).unwrap();
        conn.insert_rows(
            "bronze",
            "types",
            &columns,
            &[vec![
                Value::Integer(7),
                Value::Float(1.5),
                Value::Boolean(true),
                Value::Timestamp(ts),
                Value::Null,
            ]],
        )
        .unwrap();

        let result = conn.query("SELECT * FROM bronze.types").unwrap();
        assert_eq!(result.columns, vec!["i", "f", "b", "ts", "s"]);
        assert_eq!(
            result.rows[0],
            vec![
                Value::Integer(7),
                Value::Float(1.5),
                Value::Boolean(true),
                Value::Timestamp(ts),
                Value::Null,
            ]
        );
    }

    #[test]
    fn clones_share_the_database() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let a = store.connect().unwrap();
        let b = store.connect().unwrap();
        a.ensure_schema("bronze").unwrap();
        a.create_table("bronze", "shared", &id_name_columns()).unwrap();
        assert!(b.table_exists("bronze", "shared").unwrap());
    }

    #[test]
    fn readonly_store_rejects_writes() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("bronze.duckdb");
        {
            let store = DuckDbStore::open(&path).unwrap();
            let conn = store.connect().unwrap();
            conn.ensure_schema("bronze").unwrap();
        }

        let store = DuckDbStore::open_readonly(&path).unwrap();
        let conn = store.connect().unwrap();
        let err = conn.ensure_schema("other").unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly));
        assert!(conn.list_tables("bronze").unwrap().is_empty());
    }

    #[test]
    fn time_conversions_reject_overflow() {
        use duckdb::types::TimeUnit;

        assert_eq!(micros_from(TimeUnit::Second, 2).unwrap(), 2_000_000);
        assert_eq!(micros_from(TimeUnit::Nanosecond, 5_000).unwrap(), 5);
        assert!(matches!(
            micros_from(TimeUnit::Second, i64::MAX),
            Err(StoreError::TypeConversion(_))
        ));
        assert!(matches!(
            micros_from(TimeUnit::Millisecond, i64::MIN),
            Err(StoreError::TypeConversion(_))
        ));

        assert_eq!(
            date_from_days(0).unwrap(),
            Value::Timestamp(chrono::DateTime::from_timestamp(0, 0).unwrap())
        );
        assert!(matches!(
            date_from_days(i32::MAX),
            Err(StoreError::TypeConversion(_))
        ));
    }
}
