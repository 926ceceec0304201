//! Full-refresh landing writer: stage, verify, swap.

use bronze_store::{staging_table_name, LandingConnection};
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::reconcile::{LoadAction, LoadPlan};

/// Makes a landing table contain exactly a plan's rows.
///
/// Readers of the landing table only ever see the previous contents or the new
/// contents: rows land in a staging table that is verified and then swapped in
/// within one store transaction.
#[derive(Debug, Clone)]
pub struct LandingWriter {
    namespace: String,
}

impl LandingWriter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Apply `plan`, returning the number of rows now in the landing table.
    pub fn write(&self, conn: &dyn LandingConnection, plan: &LoadPlan) -> Result<u64> {
        let table = plan.table.as_str();

        if plan.action == LoadAction::Extend {
            conn.add_columns(&self.namespace, table, &plan.new_columns)
                .map_err(|e| IngestError::write(table, e))?;
            info!(
                table = %table,
                added = plan.new_columns.len(),
                "Extended landing table"
            );
        }

        let staging = staging_table_name(table);
        conn.create_table(&self.namespace, &staging, &plan.columns)
            .map_err(|e| IngestError::write(table, e))?;
        debug!(table = %table, staging = %staging, "Created staging table");

        match self.load_staging(conn, plan, &staging) {
            Ok(rows) => {
                info!(
                    table = %table,
                    rows,
                    action = %plan.action,
                    "Landing table refreshed"
                );
                Ok(rows)
            }
            Err(err) => {
                if let Err(drop_err) = conn.drop_table(&self.namespace, &staging) {
                    warn!(
                        table = %table,
                        staging = %staging,
                        "Failed to drop staging table: {}",
                        drop_err
                    );
                }
                Err(err)
            }
        }
    }

    fn load_staging(&self, conn: &dyn LandingConnection, plan: &LoadPlan, staging: &str) -> Result<u64> {
        let table = plan.table.as_str();
        let expected = plan.row_count();

        conn.insert_rows(&self.namespace, staging, &plan.columns, &plan.rows)
            .map_err(|e| IngestError::write(table, e))?;

        let actual = conn
            .count_rows(&self.namespace, staging)
            .map_err(|e| IngestError::write(table, e))?;
        if actual != expected {
            return Err(IngestError::LoadVerificationFailed {
                table: table.to_string(),
                expected,
                actual,
            });
        }

        conn.swap_table(&self.namespace, staging, table)
            .map_err(|e| IngestError::write(table, e))?;
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::reconcile::reconcile;
    use crate::source::SourceKind;
    use bronze_store::{ColumnDef, ColumnType, DuckDbStore, LandingStore, ResultSet, Value};
    use chrono::Utc;

    /// Delegates to a real connection but reports a wrong staging row count.
    struct MiscountingConnection {
        inner: Box<dyn LandingConnection>,
    }

    impl LandingConnection for MiscountingConnection {
        fn execute(&self, sql: &str) -> bronze_store::Result<u64> {
            self.inner.execute(sql)
        }
        fn query(&self, sql: &str) -> bronze_store::Result<ResultSet> {
            self.inner.query(sql)
        }
        fn ensure_schema(&self, schema: &str) -> bronze_store::Result<()> {
            self.inner.ensure_schema(schema)
        }
        fn list_tables(&self, schema: &str) -> bronze_store::Result<Vec<String>> {
            self.inner.list_tables(schema)
        }
        fn table_exists(&self, schema: &str, name: &str) -> bronze_store::Result<bool> {
            self.inner.table_exists(schema, name)
        }
        fn describe_table(&self, schema: &str, name: &str) -> bronze_store::Result<Vec<ColumnDef>> {
            self.inner.describe_table(schema, name)
        }
        fn create_table(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> bronze_store::Result<()> {
            self.inner.create_table(schema, name, columns)
        }
        fn add_columns(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> bronze_store::Result<()> {
            self.inner.add_columns(schema, name, columns)
        }
        fn insert_rows(
            &self,
            schema: &str,
            name: &str,
            columns: &[ColumnDef],
            rows: &[Vec<Value>],
        ) -> bronze_store::Result<u64> {
            self.inner.insert_rows(schema, name, columns, rows)
        }
        fn swap_table(&self, schema: &str, staging: &str, final_name: &str) -> bronze_store::Result<()> {
            self.inner.swap_table(schema, staging, final_name)
        }
        fn count_rows(&self, schema: &str, name: &str) -> bronze_store::Result<u64> {
            Ok(self.inner.count_rows(schema, name)? + 1)
        }
        fn drop_table(&self, schema: &str, name: &str) -> bronze_store::Result<()> {
            self.inner.drop_table(schema, name)
        }
    }

    fn plan(rows: Vec<Vec<Value>>, existing: &[ColumnDef]) -> LoadPlan {
        let batch = Batch::new(
            "customers",
            SourceKind::Database,
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("name", ColumnType::Text),
            ],
            rows,
            Utc::now(),
        )
        .unwrap();
        reconcile(batch, existing).unwrap()
    }

    fn store() -> (DuckDbStore, Box<dyn LandingConnection>) {
        let store = DuckDbStore::open_in_memory().unwrap();
        let conn = store.connect().unwrap();
        conn.ensure_schema("bronze").unwrap();
        (store, conn)
    }

    #[test]
    fn test_full_refresh_replaces_rows() {
        let (_store, conn) = store();
        let writer = LandingWriter::new("bronze");

        let first = plan(
            vec![
                vec![Value::Integer(1), Value::from("A")],
                vec![Value::Integer(2), Value::from("B")],
            ],
            &[],
        );
        assert_eq!(writer.write(conn.as_ref(), &first).unwrap(), 2);

        let existing = conn.describe_table("bronze", "customers").unwrap();
        let second = plan(
            vec![
                vec![Value::Integer(1), Value::from("A")],
                vec![Value::Integer(3), Value::from("C")],
            ],
            &existing,
        );
        assert_eq!(second.action, LoadAction::Match);
        assert_eq!(writer.write(conn.as_ref(), &second).unwrap(), 2);

        let result = conn
            .query("SELECT id FROM bronze.customers ORDER BY id")
            .unwrap();
        assert_eq!(
            result.rows,
            vec![vec![Value::Integer(1)], vec![Value::Integer(3)]]
        );
        assert_eq!(conn.list_tables("bronze").unwrap(), vec!["customers"]);
    }

    #[test]
    fn test_verification_failure_keeps_previous_contents() {
        let (_store, conn) = store();
        let writer = LandingWriter::new("bronze");
        writer
            .write(
                conn.as_ref(),
                &plan(vec![vec![Value::Integer(1), Value::from("A")]], &[]),
            )
            .unwrap();

        let lying = MiscountingConnection { inner: conn };
        let existing = lying.describe_table("bronze", "customers").unwrap();
        let err = writer
            .write(
                &lying,
                &plan(
                    vec![
                        vec![Value::Integer(7), Value::from("X")],
                        vec![Value::Integer(8), Value::from("Y")],
                    ],
                    &existing,
                ),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::LoadVerificationFailed {
                expected: 2,
                actual: 3,
                ..
            }
        ));
        let result = lying.query("SELECT id, name FROM bronze.customers").unwrap();
        assert_eq!(
            result.rows,
            vec![vec![Value::Integer(1), Value::from("A")]]
        );
        // Staging table was cleaned up.
        let tables = lying
            .query("SELECT table_name FROM information_schema.tables WHERE table_schema = 'bronze'")
            .unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn test_store_failure_maps_to_write_error() {
        let (_store, conn) = store();
        let writer = LandingWriter::new("missing_schema");
        let err = writer
            .write(
                conn.as_ref(),
                &plan(vec![vec![Value::Integer(1), Value::from("A")]], &[]),
            )
            .unwrap_err();
        assert!(matches!(err, IngestError::Write { .. }));
    }
}
