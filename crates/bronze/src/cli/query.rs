//! `bronze query`: run read-only SQL against the landing store.

use anyhow::Context;
use bronze_store::{DuckDbStore, LandingConnection, Value};
use clap::Args;
use serde::Serialize;

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_value, print_json, print_table};
use crate::cli::{StoreArgs, EXIT_SUCCESS};

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// SQL to execute (the store is opened read-only)
    pub sql: String,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Maximum rows to print
    #[arg(long, default_value = "100")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    truncated: bool,
}

pub fn run(args: QueryArgs) -> anyhow::Result<u8> {
    let target = args.store.resolve()?;
    if !target.path.exists() {
        return Err(HelpfulError::store_not_found(&target.path).into());
    }

    let store = DuckDbStore::open_readonly(&target.path)
        .with_context(|| format!("Failed to open landing store {}", target.path.display()))?;
    let conn = store.connection()?;
    let mut result = conn.query(&args.sql).map_err(|e| {
        HelpfulError::new("Query failed")
            .with_context(e.to_string())
            .with_suggestion(format!(
                "TRY: Qualify landing tables with the namespace, e.g. {}.<table>",
                target.namespace
            ))
            .with_suggestion("TRY: List tables: bronze tables")
    })?;

    let truncated = result.rows.len() > args.limit;
    result.rows.truncate(args.limit);

    if args.json {
        print_json(&QueryOutput {
            columns: result.columns,
            rows: result.rows,
            truncated,
        })?;
        return Ok(EXIT_SUCCESS);
    }

    let headers: Vec<&str> = result.columns.iter().map(String::as_str).collect();
    let shown = result.rows.len();
    let rows = result
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();
    print_table(&headers, rows);
    if truncated {
        println!("(showing first {} rows; raise --limit for more)", shown);
    } else {
        println!("({} rows)", shown);
    }
    Ok(EXIT_SUCCESS)
}
