//! Relational sources read through `sqlx`.
//!
//! PostgreSQL is the production source; SQLite files serve local and test sources.
//! Column metadata comes from the prepared statement, so empty tables still
//! report their columns.

use bronze_store::sql::quote_ident;
use bronze_store::{ColumnDef, ColumnType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

use super::{SourceDescriptor, SourceKind};
use crate::batch::Batch;
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    fn for_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Backend::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Backend::Sqlite)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DatabaseReader;

impl DatabaseReader {
    pub async fn read_all(&self, source: &SourceDescriptor) -> Result<Batch> {
        let extracted_at = Utc::now();
        let backend = Backend::for_url(&source.location).ok_or_else(|| {
            IngestError::unavailable(
                &source.id,
                "unsupported database URL (expected postgres://, postgresql:// or sqlite:)",
            )
        })?;

        let (columns, rows) = match backend {
            Backend::Postgres => read_postgres(source).await?,
            Backend::Sqlite => read_sqlite(source).await?,
        };

        debug!(
            source = %source.id,
            table = %source.source_table(),
            rows = rows.len(),
            "Read database table"
        );

        Batch::new(
            source.id.clone(),
            SourceKind::Database,
            columns,
            rows,
            extracted_at,
        )
        .map_err(|e| IngestError::read(&source.id, e))
    }
}

type Table = (Vec<ColumnDef>, Vec<Vec<Value>>);

fn select_all_sql(table: &str) -> String {
    let qualified = table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".");
    format!("SELECT * FROM {}", qualified)
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum PgDecoder {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Bool,
    Timestamp,
    Timestamptz,
    Date,
    Text,
    Uuid,
    Json,
}

impl PgDecoder {
    fn for_type(name: &str) -> Option<Self> {
        let decoder = match name {
            "INT2" => PgDecoder::Int2,
            "INT4" => PgDecoder::Int4,
            "INT8" => PgDecoder::Int8,
            "FLOAT4" => PgDecoder::Float4,
            "FLOAT8" => PgDecoder::Float8,
            "NUMERIC" => PgDecoder::Numeric,
            "BOOL" => PgDecoder::Bool,
            "TIMESTAMP" => PgDecoder::Timestamp,
            "TIMESTAMPTZ" => PgDecoder::Timestamptz,
            "DATE" => PgDecoder::Date,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => PgDecoder::Text,
            "UUID" => PgDecoder::Uuid,
            "JSON" | "JSONB" => PgDecoder::Json,
            _ => return None,
        };
        Some(decoder)
    }

    fn column_type(self) -> ColumnType {
        match self {
            PgDecoder::Int2 | PgDecoder::Int4 | PgDecoder::Int8 => ColumnType::Integer,
            PgDecoder::Float4 | PgDecoder::Float8 | PgDecoder::Numeric => ColumnType::Float,
            PgDecoder::Bool => ColumnType::Boolean,
            PgDecoder::Timestamp | PgDecoder::Timestamptz | PgDecoder::Date => {
                ColumnType::Timestamp
            }
            PgDecoder::Text | PgDecoder::Uuid | PgDecoder::Json => ColumnType::Text,
        }
    }

    fn decode(self, row: &PgRow, index: usize) -> std::result::Result<Value, String> {
        let value = match self {
            PgDecoder::Int2 => get::<i16>(row, index)?.map_or(Value::Null, |v| Value::Integer(v.into())),
            PgDecoder::Int4 => get::<i32>(row, index)?.map_or(Value::Null, |v| Value::Integer(v.into())),
            PgDecoder::Int8 => get::<i64>(row, index)?.map_or(Value::Null, Value::Integer),
            PgDecoder::Float4 => get::<f32>(row, index)?.map_or(Value::Null, |v| Value::Float(v.into())),
            PgDecoder::Float8 => get::<f64>(row, index)?.map_or(Value::Null, Value::Float),
            PgDecoder::Numeric => match get::<Decimal>(row, index)? {
                None => Value::Null,
                Some(d) => d
                    .to_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("numeric {} out of range for float", d))?,
            },
            PgDecoder::Bool => get::<bool>(row, index)?.map_or(Value::Null, Value::Boolean),
            PgDecoder::Timestamp => get::<NaiveDateTime>(row, index)?
                .map_or(Value::Null, |v| Value::Timestamp(v.and_utc())),
            PgDecoder::Timestamptz => {
                get::<DateTime<Utc>>(row, index)?.map_or(Value::Null, Value::Timestamp)
            }
            PgDecoder::Date => get::<NaiveDate>(row, index)?
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(Value::Null, |v| Value::Timestamp(v.and_utc())),
            PgDecoder::Text => get::<String>(row, index)?.map_or(Value::Null, Value::Text),
            PgDecoder::Uuid => {
                get::<uuid::Uuid>(row, index)?.map_or(Value::Null, |v| Value::Text(v.to_string()))
            }
            PgDecoder::Json => get::<serde_json::Value>(row, index)?
                .map_or(Value::Null, |v| Value::Text(v.to_string())),
        };
        Ok(value)
    }
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> std::result::Result<Option<T>, String>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index).map_err(|e| e.to_string())
}

async fn read_postgres(source: &SourceDescriptor) -> Result<Table> {
    let mut conn = PgConnection::connect(&source.location)
        .await
        .map_err(|e| IngestError::unavailable(&source.id, format!("cannot connect: {}", e)))?;

    let table = read_postgres_table(&mut conn, source).await?;

    if let Err(e) = conn.close().await {
        debug!(source = %source.id, "Error closing source connection: {}", e);
    }
    Ok(table)
}

async fn read_postgres_table(conn: &mut PgConnection, source: &SourceDescriptor) -> Result<Table> {
    let sql = select_all_sql(source.source_table());

    let statement = (&mut *conn).prepare(&sql).await.map_err(|e| {
        IngestError::unavailable(
            &source.id,
            format!("cannot query {}: {}", source.source_table(), e),
        )
    })?;

    let mut columns = Vec::with_capacity(statement.columns().len());
    let mut decoders = Vec::with_capacity(statement.columns().len());
    for column in statement.columns() {
        let type_name = column.type_info().name();
        let decoder = PgDecoder::for_type(type_name).ok_or_else(|| {
            IngestError::read(
                &source.id,
                format!(
                    "column '{}' has unsupported type {}",
                    column.name(),
                    type_name
                ),
            )
        })?;
        columns.push(ColumnDef::new(column.name(), decoder.column_type()));
        decoders.push(decoder);
    }
    drop(statement);

    let pg_rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            IngestError::unavailable(
                &source.id,
                format!("cannot query {}: {}", source.source_table(), e),
            )
        })?;

    let mut rows = Vec::with_capacity(pg_rows.len());
    for (row_index, row) in pg_rows.iter().enumerate() {
        let mut values = Vec::with_capacity(decoders.len());
        for (index, decoder) in decoders.iter().enumerate() {
            let value = decoder.decode(row, index).map_err(|e| {
                IngestError::read(
                    &source.id,
                    format!("row {} column '{}': {}", row_index + 1, columns[index].name, e),
                )
            })?;
            values.push(value);
        }
        rows.push(values);
    }
    Ok((columns, rows))
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

async fn read_sqlite(source: &SourceDescriptor) -> Result<Table> {
    let mut conn = SqliteConnection::connect(&source.location)
        .await
        .map_err(|e| IngestError::unavailable(&source.id, format!("cannot connect: {}", e)))?;

    let table = read_sqlite_table(&mut conn, source).await?;

    if let Err(e) = conn.close().await {
        debug!(source = %source.id, "Error closing source connection: {}", e);
    }
    Ok(table)
}

async fn read_sqlite_table(
    conn: &mut SqliteConnection,
    source: &SourceDescriptor,
) -> Result<Table> {
    let sql = select_all_sql(source.source_table());

    let statement = (&mut *conn).prepare(&sql).await.map_err(|e| {
        IngestError::unavailable(
            &source.id,
            format!("cannot query {}: {}", source.source_table(), e),
        )
    })?;
    // `None` means no declared type; the column type is taken from the values.
    let declared: Vec<(String, Option<ColumnType>)> = statement
        .columns()
        .iter()
        .map(|column| {
            let type_name = column.type_info().name();
            let family = if type_name.eq_ignore_ascii_case("NULL") {
                None
            } else {
                Some(ColumnType::from_sql_type(type_name))
            };
            (column.name().to_string(), family)
        })
        .collect();
    drop(statement);

    let sqlite_rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            IngestError::unavailable(
                &source.id,
                format!("cannot query {}: {}", source.source_table(), e),
            )
        })?;

    let mut raw_rows = Vec::with_capacity(sqlite_rows.len());
    for (row_index, row) in sqlite_rows.iter().enumerate() {
        let mut values = Vec::with_capacity(declared.len());
        for (index, (name, _)) in declared.iter().enumerate() {
            let value = decode_storage_class(row, index).map_err(|e| {
                IngestError::read(
                    &source.id,
                    format!("row {} column '{}': {}", row_index + 1, name, e),
                )
            })?;
            values.push(value);
        }
        raw_rows.push(values);
    }

    let columns: Vec<ColumnDef> = declared
        .iter()
        .enumerate()
        .map(|(index, (name, family))| {
            let column_type = family.unwrap_or_else(|| {
                observed_type(raw_rows.iter().map(|row| &row[index]))
            });
            ColumnDef::new(name.clone(), column_type)
        })
        .collect();

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (row_index, raw) in raw_rows.into_iter().enumerate() {
        let mut values = Vec::with_capacity(columns.len());
        for (column, value) in columns.iter().zip(raw) {
            let coerced = coerce_declared(&value, column.column_type).ok_or_else(|| {
                IngestError::read(
                    &source.id,
                    format!(
                        "row {} column '{}': value {} does not fit declared type {}",
                        row_index + 1,
                        column.name,
                        value,
                        column.column_type
                    ),
                )
            })?;
            values.push(coerced);
        }
        rows.push(values);
    }
    Ok((columns, rows))
}

fn decode_storage_class(row: &SqliteRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" => Value::Integer(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

/// Type shared by every non-null value; Text when values disagree or none exist.
fn observed_type<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut observed = None;
    for value in values {
        match (observed, value.column_type()) {
            (_, None) => {}
            (None, Some(ty)) => observed = Some(ty),
            (Some(prev), Some(ty)) if prev == ty => {}
            (Some(ColumnType::Integer), Some(ColumnType::Float))
            | (Some(ColumnType::Float), Some(ColumnType::Integer)) => {
                observed = Some(ColumnType::Float)
            }
            _ => return ColumnType::Text,
        }
    }
    observed.unwrap_or(ColumnType::Text)
}

/// SQLite stores booleans as 0/1 and may store timestamps as unix seconds.
fn coerce_declared(value: &Value, declared: ColumnType) -> Option<Value> {
    match (value, declared) {
        (Value::Integer(v), ColumnType::Boolean) if *v == 0 || *v == 1 => {
            Some(Value::Boolean(*v == 1))
        }
        (Value::Integer(v), ColumnType::Timestamp) => {
            DateTime::from_timestamp(*v, 0).map(Value::Timestamp)
        }
        _ => value.coerce_to(declared),
    }
}
