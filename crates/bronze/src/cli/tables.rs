//! `bronze tables`: list landing tables with row counts.

use anyhow::Context;
use bronze_store::{ColumnDef, DuckDbStore, LandingConnection};
use clap::Args;
use serde::Serialize;

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_number, print_json, print_table};
use crate::cli::{StoreArgs, EXIT_SUCCESS};

#[derive(Args, Debug, Clone)]
pub struct TablesArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TableInfo {
    table: String,
    rows: u64,
    columns: Vec<ColumnDef>,
}

pub fn run(args: TablesArgs) -> anyhow::Result<u8> {
    let target = args.store.resolve()?;
    if !target.path.exists() {
        return Err(HelpfulError::store_not_found(&target.path).into());
    }

    let store = DuckDbStore::open_readonly(&target.path)
        .with_context(|| format!("Failed to open landing store {}", target.path.display()))?;
    let conn = store.connection()?;

    let mut tables = Vec::new();
    for table in conn.list_tables(&target.namespace)? {
        let rows = conn.count_rows(&target.namespace, &table)?;
        let columns = conn.describe_table(&target.namespace, &table)?;
        tables.push(TableInfo {
            table,
            rows,
            columns,
        });
    }

    if args.json {
        print_json(&tables)?;
        return Ok(EXIT_SUCCESS);
    }

    if tables.is_empty() {
        println!(
            "No landing tables in '{}' ({})",
            target.namespace,
            target.path.display()
        );
        return Ok(EXIT_SUCCESS);
    }

    let rows = tables
        .iter()
        .map(|t| {
            vec![
                format!("{}.{}", target.namespace, t.table),
                format_number(t.rows),
                t.columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.column_type))
                    .collect::<Vec<_>>()
                    .join(", "),
            ]
        })
        .collect();
    print_table(&["TABLE", "ROWS", "COLUMNS"], rows);
    Ok(EXIT_SUCCESS)
}
