//! Pipeline orchestrator: Reader → Enricher → Reconciler → Writer per source.
//!
//! Sources run on their own tokio tasks with at most `concurrency` in flight.
//! A failure (or panic) in one source becomes that source's outcome and never
//! touches the others.

use bronze_store::{LandingStore, STAGING_PREFIX};
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::enrich::enrich;
use crate::error::{IngestError, Result};
use crate::reconcile::{reconcile, LoadAction};
use crate::report::{RunOutcome, RunReporter, RunSummary};
use crate::source::{DefaultSourceReader, SourceDescriptor, SourceReader};
use crate::writer::LandingWriter;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_NAMESPACE: &str = "bronze";

/// Cooperative cancellation flag, checked at every stage boundary.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Underlying flag, for registering OS signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub namespace: String,
    pub concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn LandingStore>,
    reader: Arc<dyn SourceReader>,
    sources: Vec<SourceDescriptor>,
    writer: LandingWriter,
    concurrency: usize,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    /// Validate the run and prepare the landing namespace.
    ///
    /// Fails with [`IngestError::OrchestratorInit`] when the source list is empty,
    /// an identifier is invalid or repeated, or the store is unreachable.
    pub fn new(
        store: Arc<dyn LandingStore>,
        sources: Vec<SourceDescriptor>,
        options: PipelineOptions,
    ) -> Result<Self> {
        validate_identifier("namespace", &options.namespace)?;
        validate_sources(&sources)?;

        let conn = store.connect().map_err(|e| {
            IngestError::init(format!(
                "cannot connect to landing store {}: {}",
                store.location(),
                e
            ))
        })?;
        conn.ensure_schema(&options.namespace).map_err(|e| {
            IngestError::init(format!(
                "cannot create namespace '{}': {}",
                options.namespace, e
            ))
        })?;
        drop(conn);

        let concurrency = options.concurrency.max(1);
        info!(
            store = %store.location(),
            namespace = %options.namespace,
            sources = sources.len(),
            concurrency,
            "Pipeline initialized"
        );

        Ok(Self {
            store,
            reader: Arc::new(DefaultSourceReader::new()),
            sources,
            writer: LandingWriter::new(options.namespace),
            concurrency,
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn with_reader(mut self, reader: Arc<dyn SourceReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn namespace(&self) -> &str {
        self.writer.namespace()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every source; completes once each one has an outcome.
    pub async fn run(&self) -> RunSummary {
        let mut reporter = RunReporter::new(
            self.namespace(),
            self.sources.iter().map(|s| s.id.clone()),
        );
        info!(
            run_id = %reporter.run_id(),
            sources = self.sources.len(),
            concurrency = self.concurrency,
            "Starting bronze run"
        );

        let ctx = Arc::new(SourceContext {
            store: Arc::clone(&self.store),
            reader: Arc::clone(&self.reader),
            writer: self.writer.clone(),
            shutdown: self.shutdown.clone(),
        });

        let mut outcomes = stream::iter(self.sources.clone())
            .map(|source| run_source_task(Arc::clone(&ctx), source))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            reporter.record(outcome);
        }

        let summary = reporter.finish();
        info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            rows = summary.rows_loaded(),
            status = summary.status.as_str(),
            "Bronze run finished"
        );
        summary
    }
}

/// Restrict `sources` to `only` (in configuration order). Unknown ids are an init error.
pub fn select_sources(
    sources: Vec<SourceDescriptor>,
    only: &[String],
) -> Result<Vec<SourceDescriptor>> {
    if only.is_empty() {
        return Ok(sources);
    }
    let unknown: Vec<&str> = only
        .iter()
        .filter(|id| !sources.iter().any(|s| &s.id == *id))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(IngestError::init(format!(
            "unknown source id(s): {}",
            unknown.join(", ")
        )));
    }
    Ok(sources
        .into_iter()
        .filter(|s| only.iter().any(|id| id == &s.id))
        .collect())
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn validate_identifier(what: &str, name: &str) -> Result<()> {
    if !is_valid_identifier(name) {
        return Err(IngestError::init(format!(
            "invalid {} '{}': must match [A-Za-z_][A-Za-z0-9_]*",
            what, name
        )));
    }
    Ok(())
}

fn validate_sources(sources: &[SourceDescriptor]) -> Result<()> {
    if sources.is_empty() {
        return Err(IngestError::init("no sources configured"));
    }
    let mut seen = HashSet::new();
    for source in sources {
        validate_identifier("source id", &source.id)?;
        if source.id.starts_with(STAGING_PREFIX) {
            return Err(IngestError::init(format!(
                "source id '{}' uses the reserved prefix {}",
                source.id, STAGING_PREFIX
            )));
        }
        // Landing table names are case-insensitive.
        if !seen.insert(source.id.to_ascii_lowercase()) {
            return Err(IngestError::init(format!(
                "duplicate source id '{}'",
                source.id
            )));
        }
    }
    Ok(())
}

struct SourceContext {
    store: Arc<dyn LandingStore>,
    reader: Arc<dyn SourceReader>,
    writer: LandingWriter,
    shutdown: ShutdownSignal,
}

impl SourceContext {
    fn checkpoint(&self, stage: &str) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(IngestError::Cancelled(format!("shutdown requested before {}", stage)));
        }
        Ok(())
    }

    async fn load(&self, source: &SourceDescriptor) -> Result<(u64, LoadAction)> {
        self.checkpoint("read")?;
        let batch = self.reader.read_all(source).await?;
        info!(
            source = %source.id,
            rows = batch.len(),
            columns = batch.columns().len(),
            "Source read"
        );

        self.checkpoint("enrich")?;
        let batch = enrich(batch);

        self.checkpoint("reconcile")?;
        let store = Arc::clone(&self.store);
        let writer = self.writer.clone();
        let shutdown = self.shutdown.clone();
        let table = source.id.clone();

        tokio::task::spawn_blocking(move || -> Result<(u64, LoadAction)> {
            let conn = store.connect().map_err(|e| IngestError::write(&table, e))?;
            let existing = conn
                .describe_table(writer.namespace(), &table)
                .map_err(|e| IngestError::write(&table, e))?;
            let plan = reconcile(batch, &existing)?;
            debug!(
                table = %table,
                action = %plan.action,
                columns = plan.columns.len(),
                "Reconciled schema"
            );

            if shutdown.is_triggered() {
                return Err(IngestError::Cancelled(
                    "shutdown requested before write".to_string(),
                ));
            }
            let rows = writer.write(conn.as_ref(), &plan)?;
            Ok((rows, plan.action))
        })
        .await
        .map_err(|e| IngestError::TaskPanicked(format!("landing task for '{}': {}", source.id, e)))?
    }
}

async fn run_source_task(ctx: Arc<SourceContext>, source: SourceDescriptor) -> RunOutcome {
    if ctx.shutdown.is_triggered() {
        warn!(source = %source.id, "Skipping source: shutdown requested");
        return RunOutcome::failed(
            &source.id,
            &IngestError::Cancelled("shutdown requested before source started".to_string()),
            Duration::ZERO,
        );
    }

    let started = Instant::now();
    let source_id = source.id.clone();
    match tokio::spawn(process_source(ctx, source)).await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let message = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                join_err.to_string()
            };
            error!(source = %source_id, "Source task panicked: {}", message);
            RunOutcome::failed(
                &source_id,
                &IngestError::TaskPanicked(message),
                started.elapsed(),
            )
        }
    }
}

async fn process_source(ctx: Arc<SourceContext>, source: SourceDescriptor) -> RunOutcome {
    let started = Instant::now();
    info!(source = %source.id, kind = %source.kind, "Source started");

    match ctx.load(&source).await {
        Ok((rows, action)) => {
            info!(
                source = %source.id,
                rows,
                action = %action,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Source loaded"
            );
            RunOutcome::succeeded(&source.id, rows, action, started.elapsed())
        }
        Err(err) => {
            error!(
                source = %source.id,
                kind = %err.kind(),
                "Source failed: {}",
                err
            );
            RunOutcome::failed(&source.id, &err, started.elapsed())
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use bronze_store::DuckDbStore;

    fn memory_store() -> Arc<dyn LandingStore> {
        Arc::new(DuckDbStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("customers"));
        assert!(is_valid_identifier("_events2"));
        assert!(!is_valid_identifier("2events"));
        assert!(!is_valid_identifier("user-events"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_init_rejects_empty_sources() {
        let err = Pipeline::new(memory_store(), Vec::new(), PipelineOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::OrchestratorInitError);
    }

    #[test]
    fn test_init_rejects_duplicate_ids_case_insensitively() {
        let sources = vec![
            SourceDescriptor::file("events", "a.csv"),
            SourceDescriptor::file("EVENTS", "b.csv"),
        ];
        let err = Pipeline::new(memory_store(), sources, PipelineOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("duplicate source id"));
    }

    #[test]
    fn test_init_rejects_reserved_prefix_and_bad_namespace() {
        let err = Pipeline::new(
            memory_store(),
            vec![SourceDescriptor::file("__bronze_stage_x", "a.csv")],
            PipelineOptions::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::OrchestratorInitError);

        let err = Pipeline::new(
            memory_store(),
            vec![SourceDescriptor::file("events", "a.csv")],
            PipelineOptions {
                namespace: "bad name".to_string(),
                concurrency: 2,
            },
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::OrchestratorInitError);
    }

    #[test]
    fn test_init_creates_namespace_and_clamps_concurrency() {
        let store = memory_store();
        let pipeline = Pipeline::new(
            Arc::clone(&store),
            vec![SourceDescriptor::file("events", "a.csv")],
            PipelineOptions {
                namespace: "landing".to_string(),
                concurrency: 0,
            },
        )
        .unwrap();
        assert_eq!(pipeline.concurrency(), 1);

        let conn = store.connect().unwrap();
        let schemas = conn
            .query("SELECT schema_name FROM information_schema.schemata WHERE schema_name = 'landing'")
            .unwrap();
        assert_eq!(schemas.len(), 1);
    }

    #[test]
    fn test_select_sources() {
        let sources = vec![
            SourceDescriptor::file("a", "a.csv"),
            SourceDescriptor::file("b", "b.csv"),
            SourceDescriptor::file("c", "c.csv"),
        ];
        let picked = select_sources(sources.clone(), &["c".to_string(), "a".to_string()]).unwrap();
        let ids: Vec<&str> = picked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        assert_eq!(select_sources(sources.clone(), &[]).unwrap().len(), 3);

        let err = select_sources(sources, &["zzz".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OrchestratorInitError);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic payload");
    }
}
