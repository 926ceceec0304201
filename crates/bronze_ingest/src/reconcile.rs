//! Schema reconciliation between an incoming batch and its landing table.

use bronze_store::{ColumnDef, Value};
use serde::Serialize;
use std::fmt;

use crate::batch::Batch;
use crate::error::{IngestError, Result};

/// Structural decision for one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadAction {
    /// No landing table yet; it is created with the batch's columns.
    #[serde(rename = "created")]
    Create,
    /// The batch brings new columns; they are appended to the table.
    #[serde(rename = "extended")]
    Extend,
    /// The batch fits the existing columns.
    #[serde(rename = "matched")]
    Match,
}

impl LoadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadAction::Create => "created",
            LoadAction::Extend => "extended",
            LoadAction::Match => "matched",
        }
    }
}

impl fmt::Display for LoadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the writer needs to replace a landing table's contents.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub table: String,
    pub action: LoadAction,
    /// Target schema: table columns in table order, then appended columns.
    pub columns: Vec<ColumnDef>,
    /// Columns the live table must gain before loading (non-empty only for `Extend`).
    pub new_columns: Vec<ColumnDef>,
    /// Batch rows aligned and coerced to `columns`, in batch order.
    pub rows: Vec<Vec<Value>>,
}

impl LoadPlan {
    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }
}

/// Decide Create / Extend / Match for `batch` against the table's current columns.
///
/// Names compare case-insensitively. A shared column whose types differ is accepted
/// only if every non-null batch value coerces to the table's type.
pub fn reconcile(batch: Batch, existing: &[ColumnDef]) -> Result<LoadPlan> {
    let (table, _, batch_columns, batch_rows, _) = batch.into_parts();

    if existing.is_empty() {
        return Ok(LoadPlan {
            table,
            action: LoadAction::Create,
            columns: batch_columns,
            new_columns: Vec::new(),
            rows: batch_rows,
        });
    }

    let mut target: Vec<ColumnDef> = existing.to_vec();
    let mut new_columns = Vec::new();
    // Target position for each batch column.
    let mut positions = Vec::with_capacity(batch_columns.len());
    for column in &batch_columns {
        match target.iter().position(|t| t.same_name(&column.name)) {
            Some(index) => positions.push(index),
            None => {
                positions.push(target.len());
                target.push(column.clone());
                new_columns.push(column.clone());
            }
        }
    }

    let mut rows = Vec::with_capacity(batch_rows.len());
    for batch_row in batch_rows {
        let mut aligned = vec![Value::Null; target.len()];
        for ((value, &index), batch_column) in batch_row.into_iter().zip(&positions).zip(&batch_columns) {
            let target_column = &target[index];
            aligned[index] = if batch_column.column_type == target_column.column_type {
                value
            } else {
                value.coerce_to(target_column.column_type).ok_or_else(|| {
                    IngestError::SchemaConflict {
                        table: table.clone(),
                        column: target_column.name.clone(),
                        table_type: target_column.column_type,
                        batch_type: batch_column.column_type,
                        value: describe_value(&value),
                    }
                })?
            };
        }
        rows.push(aligned);
    }

    let action = if new_columns.is_empty() {
        LoadAction::Match
    } else {
        LoadAction::Extend
    };

    Ok(LoadPlan {
        table,
        action,
        columns: target,
        new_columns,
        rows,
    })
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}
