//! `bronze run`: load every configured source into the landing store.

use anyhow::Context;
use bronze_ingest::{
    select_sources, BronzeConfig, OutcomeStatus, Pipeline, PipelineOptions, RunSummary,
    ShutdownSignal,
};
use bronze_store::{DuckDbStore, LandingStore, StoreError};
use clap::Args;
use std::sync::Arc;
use tracing::info;

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_duration_ms, format_number, print_json, print_table, truncate};
use crate::cli::{StoreArgs, EXIT_PARTIAL_FAILURE, EXIT_SUCCESS};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Maximum number of sources processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Only run these source ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Output the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute a run and map its summary to an exit code.
pub fn run(args: RunArgs) -> anyhow::Result<u8> {
    let config_path = &args.store.config;
    if !config_path.exists() {
        return Err(HelpfulError::config_not_found(config_path).into());
    }

    let mut config = BronzeConfig::load(config_path)
        .map_err(|e| HelpfulError::invalid_config(config_path, &e.to_string()))?;
    if let Some(store) = &args.store.store {
        config.store_path = store.clone();
    }
    if let Some(namespace) = &args.store.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    let known: Vec<String> = config.sources.iter().map(|s| s.id.clone()).collect();
    let sources = select_sources(config.sources, &args.only).map_err(|e| {
        HelpfulError::new(e.to_string())
            .with_context(format!("Configured sources: {}", known.join(", ")))
            .with_suggestion("TRY: Pass ids exactly as they appear in [[sources]]")
    })?;

    let store = match DuckDbStore::open(&config.store_path) {
        Ok(store) => store,
        Err(StoreError::Locked(_)) => {
            return Err(HelpfulError::store_locked(&config.store_path).into())
        }
        Err(err) => {
            return Err(anyhow::Error::new(err).context(format!(
                "Failed to open landing store {}",
                config.store_path.display()
            )))
        }
    };
    let store: Arc<dyn LandingStore> = Arc::new(store);

    let shutdown = ShutdownSignal::new();
    install_signal_handlers(&shutdown)?;

    let pipeline = Pipeline::new(
        store,
        sources,
        PipelineOptions {
            namespace: config.namespace.clone(),
            concurrency: config.concurrency,
        },
    )?
    .with_shutdown(shutdown);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let summary = rt.block_on(pipeline.run());

    if args.json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }

    Ok(if summary.all_succeeded() {
        EXIT_SUCCESS
    } else {
        EXIT_PARTIAL_FAILURE
    })
}

fn install_signal_handlers(shutdown: &ShutdownSignal) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;
        use std::sync::atomic::Ordering;

        let flag = shutdown.flag();
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, stopping after current stages...", sig);
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    #[cfg(windows)]
    {
        use std::sync::atomic::Ordering;

        let flag = shutdown.flag();
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, stopping after current stages...");
            flag.store(true, Ordering::SeqCst);
        })?;
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let rows = summary
        .outcomes
        .iter()
        .map(|o| {
            vec![
                o.source_id.clone(),
                match o.status {
                    OutcomeStatus::Succeeded => "ok".to_string(),
                    OutcomeStatus::Failed => o
                        .error_kind
                        .map(|k| k.as_str().to_string())
                        .unwrap_or_else(|| "failed".to_string()),
                },
                o.rows_loaded.map(format_number).unwrap_or_default(),
                o.action.map(|a| a.to_string()).unwrap_or_default(),
                format_duration_ms(o.duration_ms),
                o.error.as_deref().map(|e| truncate(e, 80)).unwrap_or_default(),
            ]
        })
        .collect();
    print_table(
        &["SOURCE", "STATUS", "ROWS", "ACTION", "DURATION", "ERROR"],
        rows,
    );

    println!();
    println!(
        "Run {} {}: {}/{} sources loaded, {} rows into '{}'",
        summary.run_id,
        summary.status.as_str(),
        summary.succeeded,
        summary.total,
        format_number(summary.rows_loaded()),
        summary.namespace,
    );
}
