//! Per-source outcomes and the run summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ErrorKind, IngestError};
use crate::reconcile::LoadAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

/// Terminal result of one source in one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub source_id: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_loaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<LoadAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn succeeded(
        source_id: impl Into<String>,
        rows_loaded: u64,
        action: LoadAction,
        duration: Duration,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            status: OutcomeStatus::Succeeded,
            rows_loaded: Some(rows_loaded),
            action: Some(action),
            error: None,
            error_kind: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(source_id: impl Into<String>, error: &IngestError, duration: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            status: OutcomeStatus::Failed,
            rows_loaded: None,
            action: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn not_attempted(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            status: OutcomeStatus::Failed,
            rows_loaded: None,
            action: None,
            error: Some("not attempted".to_string()),
            error_kind: Some(ErrorKind::NotAttempted),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every source loaded.
    Succeeded,
    /// At least one source loaded and at least one failed.
    PartiallyFailed,
    /// No source loaded.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallyFailed => "partially_failed",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub namespace: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: RunStatus,
    /// One entry per configured source, in configuration order.
    pub outcomes: Vec<RunOutcome>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn rows_loaded(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.rows_loaded).sum()
    }

    pub fn outcome(&self, source_id: &str) -> Option<&RunOutcome> {
        self.outcomes.iter().find(|o| o.source_id == source_id)
    }
}

/// Collects outcomes as sources finish, in any order.
#[derive(Debug)]
pub struct RunReporter {
    run_id: Uuid,
    namespace: String,
    started_at: DateTime<Utc>,
    order: Vec<String>,
    outcomes: HashMap<String, RunOutcome>,
}

impl RunReporter {
    /// Pre-register every configured source, in order.
    pub fn new<I, S>(namespace: impl Into<String>, source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_id: Uuid::new_v4(),
            namespace: namespace.into(),
            started_at: Utc::now(),
            order: source_ids.into_iter().map(Into::into).collect(),
            outcomes: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record a terminal outcome. The first outcome for a source wins.
    pub fn record(&mut self, outcome: RunOutcome) {
        if !self.order.iter().any(|id| id == &outcome.source_id) {
            warn!(source = %outcome.source_id, "Ignoring outcome for unregistered source");
            return;
        }
        if self.outcomes.contains_key(&outcome.source_id) {
            warn!(source = %outcome.source_id, "Ignoring duplicate outcome");
            return;
        }
        self.outcomes.insert(outcome.source_id.clone(), outcome);
    }

    /// Close the run; sources without an outcome are reported as not attempted.
    pub fn finish(mut self) -> RunSummary {
        let outcomes: Vec<RunOutcome> = self
            .order
            .iter()
            .map(|id| {
                self.outcomes
                    .remove(id)
                    .unwrap_or_else(|| RunOutcome::not_attempted(id.clone()))
            })
            .collect();

        let total = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let failed = total - succeeded;
        let status = if failed == 0 {
            RunStatus::Succeeded
        } else if succeeded == 0 {
            RunStatus::Failed
        } else {
            RunStatus::PartiallyFailed
        };

        RunSummary {
            run_id: self.run_id,
            namespace: self.namespace,
            started_at: self.started_at,
            finished_at: Utc::now(),
            total,
            succeeded,
            failed,
            status,
            outcomes,
        }
    }
}
