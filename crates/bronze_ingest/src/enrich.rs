//! Ingestion metadata stamped onto every batch.

use bronze_store::{ColumnDef, ColumnType, Value};

use crate::batch::Batch;

pub const EXTRACTED_AT_COLUMN: &str = "extracted_at";
pub const SOURCE_TAG_COLUMN: &str = "source_tag";

/// Append `extracted_at` and `source_tag` to every row.
///
/// A source column already carrying one of these names (case-insensitive) is
/// replaced so column names stay unique.
pub fn enrich(batch: Batch) -> Batch {
    let (source_id, kind, columns, rows, extracted_at) = batch.into_parts();
    let tag = format!("{}.{}", kind, source_id);

    let keep: Vec<bool> = columns
        .iter()
        .map(|c| !c.same_name(EXTRACTED_AT_COLUMN) && !c.same_name(SOURCE_TAG_COLUMN))
        .collect();

    let mut enriched_columns: Vec<ColumnDef> = columns
        .into_iter()
        .zip(&keep)
        .filter_map(|(column, keep)| keep.then_some(column))
        .collect();
    enriched_columns.push(ColumnDef::new(EXTRACTED_AT_COLUMN, ColumnType::Timestamp));
    enriched_columns.push(ColumnDef::new(SOURCE_TAG_COLUMN, ColumnType::Text));

    let enriched_rows = rows
        .into_iter()
        .map(|row| {
            let mut values: Vec<Value> = row
                .into_iter()
                .zip(&keep)
                .filter_map(|(value, keep)| keep.then_some(value))
                .collect();
            values.push(Value::Timestamp(extracted_at));
            values.push(Value::Text(tag.clone()));
            values
        })
        .collect();

    Batch::from_checked_parts(source_id, kind, enriched_columns, enriched_rows, extracted_at)
}
