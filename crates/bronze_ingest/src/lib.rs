//! Bronze-layer ingestion pipeline.
//!
//! Reads N independent sources (database tables and delimited files), stamps
//! provenance metadata, reconciles each batch with its landing table, and
//! full-refreshes the table through a verified staging swap.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bronze_ingest::{Pipeline, PipelineOptions, SourceDescriptor};
//! use bronze_store::DuckDbStore;
//!
//! let store = Arc::new(DuckDbStore::open("data/bronze.duckdb")?);
//! let sources = vec![SourceDescriptor::file("user_events", "raw/user_events.csv")];
//! let summary = Pipeline::new(store, sources, PipelineOptions::default())?.run().await;
//! assert!(summary.all_succeeded());
//! ```

pub mod batch;
pub mod config;
pub mod enrich;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod source;
pub mod writer;

pub use batch::{Batch, BatchError};
pub use config::{config_dir, BronzeConfig, ConfigError, ResolvedConfig};
pub use enrich::{enrich, EXTRACTED_AT_COLUMN, SOURCE_TAG_COLUMN};
pub use error::{ErrorKind, IngestError, Result};
pub use orchestrator::{
    is_valid_identifier, select_sources, Pipeline, PipelineOptions, ShutdownSignal,
    DEFAULT_CONCURRENCY, DEFAULT_NAMESPACE,
};
pub use reconcile::{reconcile, LoadAction, LoadPlan};
pub use report::{OutcomeStatus, RunOutcome, RunReporter, RunStatus, RunSummary};
pub use source::{DefaultSourceReader, SourceDescriptor, SourceKind, SourceReader};
pub use writer::LandingWriter;
