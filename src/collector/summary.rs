//! Collection run summaries
//!
//! Per-pair outcomes and the aggregate summary the scheduler reports back
//! to its caller and, in digest form, to the pipeline tracker.

use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Terminal state of one (query, engine) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairStatus {
    /// Fetched and persisted successfully
    Persisted { result_count: usize },

    /// Skipped because compliance denied the request; never a failure
    Denied { reason: String },

    /// The pair failed (HTTP error, transport failure, persistence error)
    Failed { error: String },

    /// Cancellation was observed before the pair was dispatched
    Cancelled,
}

/// Outcome of one (query, engine) unit of collection work
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub engine: String,
    pub query: String,
    pub status: PairStatus,
}

/// Aggregate result of one scheduler invocation
#[derive(Debug)]
pub struct CollectionSummary {
    pub run_id: Uuid,
    pub persisted: usize,
    pub denied: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Engines that had permitted pairs but persisted nothing (zero coverage)
    pub exhausted_engines: Vec<String>,
    pub outcomes: Vec<PairOutcome>,
    pub elapsed: Duration,
}

impl CollectionSummary {
    /// Aggregates per-pair outcomes into a summary
    pub fn from_outcomes(run_id: Uuid, outcomes: Vec<PairOutcome>, elapsed: Duration) -> Self {
        let mut persisted = 0;
        let mut denied = 0;
        let mut failed = 0;
        let mut cancelled = 0;
        // engine -> (permitted pair count, persisted pair count)
        let mut per_engine: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

        for outcome in &outcomes {
            match &outcome.status {
                PairStatus::Persisted { .. } => {
                    persisted += 1;
                    let entry = per_engine.entry(outcome.engine.as_str()).or_insert((0, 0));
                    entry.0 += 1;
                    entry.1 += 1;
                }
                PairStatus::Denied { .. } => denied += 1,
                PairStatus::Failed { .. } => {
                    failed += 1;
                    per_engine.entry(outcome.engine.as_str()).or_insert((0, 0)).0 += 1;
                }
                PairStatus::Cancelled => cancelled += 1,
            }
        }

        let exhausted_engines = per_engine
            .iter()
            .filter(|(_, (permitted, ok))| *permitted > 0 && *ok == 0)
            .map(|(engine, _)| engine.to_string())
            .collect();

        Self {
            run_id,
            persisted,
            denied,
            failed,
            cancelled,
            exhausted_engines,
            outcomes,
            elapsed,
        }
    }

    /// Number of pairs that got past the compliance gate
    pub fn permitted(&self) -> usize {
        self.persisted + self.failed
    }

    /// Whether cancellation cut this invocation short
    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }

    /// Compact description of the failed pairs, for the stage error field
    ///
    /// Returns None when nothing failed.
    pub fn error_digest(&self) -> Option<String> {
        if self.failed == 0 {
            return None;
        }

        let mut details: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|outcome| match &outcome.status {
                PairStatus::Failed { error } => Some(format!(
                    "{}/{:?}: {}",
                    outcome.engine, outcome.query, error
                )),
                _ => None,
            })
            .collect();

        // Keep the digest bounded; the full outcomes stay in the summary
        const MAX_DETAILS: usize = 5;
        let omitted = details.len().saturating_sub(MAX_DETAILS);
        details.truncate(MAX_DETAILS);

        let mut digest = format!(
            "{}/{} permitted pairs failed: {}",
            self.failed,
            self.permitted(),
            details.join("; ")
        );
        if omitted > 0 {
            digest.push_str(&format!(" (and {} more)", omitted));
        }
        Some(digest)
    }
}
