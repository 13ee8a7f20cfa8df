//! Collection scheduling across engines
//!
//! [`CollectionScheduler`] fans the query set out over every collectable
//! engine. Each (query, engine) pair runs as its own task, gated by
//! compliance and admitted under its engine's throttle budget, so engines
//! never block one another and a single pair's failure never aborts the
//! run. Stage progress is reported through the pipeline tracker.

use crate::collector::fetcher::{build_http_client, build_search_url, fetch_serp, FetchOutcome};
use crate::collector::summary::{CollectionSummary, PairOutcome, PairStatus};
use crate::compliance::{ComplianceError, ComplianceGate};
use crate::config::Config;
use crate::state::{CollectionRecord, RunStatus, Stage};
use crate::storage::{Storage, StorageHandle};
use crate::throttle::EngineThrottle;
use crate::tracker::PipelineRunTracker;
use crate::SerpscopeError;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Orchestrates concurrent collection for one pipeline run at a time
pub struct CollectionScheduler {
    config: Arc<Config>,
    client: Client,
    gate: Arc<ComplianceGate>,
    throttle: Arc<EngineThrottle>,
    tracker: Arc<PipelineRunTracker>,
    storage: StorageHandle,
    cancel: CancellationToken,
}

impl CollectionScheduler {
    /// Creates a scheduler with its gate, throttle, and HTTP client
    ///
    /// The storage handle and tracker are injected; the scheduler owns
    /// neither their lifecycle nor a global instance of anything.
    pub fn new(
        config: Arc<Config>,
        storage: StorageHandle,
        tracker: Arc<PipelineRunTracker>,
    ) -> Result<Self, SerpscopeError> {
        let client = build_http_client(&config.collector)?;
        let gate = Arc::new(ComplianceGate::new(&config.collector, client.clone()));
        let throttle = Arc::new(EngineThrottle::new(&config.engines));

        Ok(Self {
            config,
            client,
            gate,
            throttle,
            tracker,
            storage,
            cancel: CancellationToken::new(),
        })
    }

    /// Token for aborting the scheduler from outside (signal handlers, tests)
    ///
    /// Cancelling it stops new admissions; in-flight fetches drain.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one collection pass over the query set
    ///
    /// Builds the cartesian set of (query, engine) pairs for collectable
    /// engines and executes them concurrently, each pair subject only to its
    /// own engine's budget. Pair outcomes are aggregated into a
    /// [`CollectionSummary`]; per-pair failures never propagate out of this
    /// method.
    ///
    /// Stage policy: the `collector` stage completes when at least one
    /// permitted pair persisted results or when every pair was denied; it
    /// fails when pairs were permitted but none succeeded. Engines whose
    /// permitted pairs all failed are reported as exhausted either way.
    /// One invocation is one attempt; retries are the caller's loop.
    pub async fn run(
        &self,
        run_id: Uuid,
        queries: &[String],
    ) -> Result<CollectionSummary, SerpscopeError> {
        let started = Instant::now();

        if self.tracker.get_run(run_id)?.status == RunStatus::Pending {
            self.tracker
                .transition_run(run_id, RunStatus::Running, None)?;
        }
        let stage_log = self.tracker.begin_stage(run_id, Stage::Collector)?;
        tracing::info!(
            "Collector stage attempt {} for run {} ({} queries)",
            stage_log.attempts,
            run_id,
            queries.len()
        );

        let pairs: Vec<(String, String, String)> = self
            .config
            .engines
            .iter()
            .filter(|(_, engine)| engine.is_collectable())
            .flat_map(|(name, engine)| {
                queries
                    .iter()
                    .map(move |query| (name.clone(), engine.endpoint.clone(), query.clone()))
            })
            .collect();

        if pairs.is_empty() {
            tracing::warn!("No (query, engine) pairs to collect for run {}", run_id);
            self.tracker
                .complete_stage(run_id, Stage::Collector, RunStatus::Completed, None)?;
            return Ok(CollectionSummary::from_outcomes(
                run_id,
                Vec::new(),
                started.elapsed(),
            ));
        }

        // Run-scoped token: external aborts propagate in, the deadline
        // watchdog fires it, and later runs get a fresh child
        let run_token = self.cancel.child_token();
        let watchdog = self.config.collector.run_deadline_ms.map(|deadline_ms| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(deadline_ms)).await;
                tracing::warn!("Run deadline of {}ms reached, stopping admissions", deadline_ms);
                token.cancel();
            })
        });

        let max_results = self.config.collector.max_results_per_query;
        let mut tasks: JoinSet<PairOutcome> = JoinSet::new();
        for (engine, endpoint, query) in pairs {
            tasks.spawn(collect_pair(
                run_id,
                engine,
                endpoint,
                query,
                self.client.clone(),
                self.gate.clone(),
                self.throttle.clone(),
                self.storage.clone(),
                run_token.clone(),
                max_results,
            ));
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome.status {
                        PairStatus::Denied { reason } => {
                            tracing::info!(
                                "Denied {}/{:?}: {}",
                                outcome.engine,
                                outcome.query,
                                reason
                            );
                        }
                        PairStatus::Failed { error } => {
                            tracing::warn!(
                                "Pair {}/{:?} failed: {}",
                                outcome.engine,
                                outcome.query,
                                error
                            );
                        }
                        _ => {}
                    }
                    outcomes.push(outcome);
                }
                Err(e) => tracing::error!("Collection task aborted: {}", e),
            }
        }

        if let Some(handle) = watchdog {
            handle.abort();
        }

        let summary = CollectionSummary::from_outcomes(run_id, outcomes, started.elapsed());

        if run_token.is_cancelled() {
            let cause = SerpscopeError::RunCancelled {
                run_id,
                reason: format!(
                    "abort signal or deadline observed after {} persisted pairs; in-flight requests drained",
                    summary.persisted
                ),
            };
            let message = cause.to_string();
            self.tracker.complete_stage(
                run_id,
                Stage::Collector,
                RunStatus::Failed,
                Some(message.clone()),
            )?;
            self.tracker
                .transition_run(run_id, RunStatus::Failed, Some(message))?;
            return Ok(summary);
        }

        if summary.permitted() > 0 && summary.persisted == 0 {
            self.tracker.complete_stage(
                run_id,
                Stage::Collector,
                RunStatus::Failed,
                summary.error_digest(),
            )?;
        } else {
            if let Some(digest) = summary.error_digest() {
                tracing::warn!("Run {} completed with reduced coverage: {}", run_id, digest);
            }
            if !summary.exhausted_engines.is_empty() {
                tracing::warn!(
                    "Run {} got no results from engines: {}",
                    run_id,
                    summary.exhausted_engines.join(", ")
                );
            }
            self.tracker
                .complete_stage(run_id, Stage::Collector, RunStatus::Completed, None)?;
        }

        tracing::info!(
            "Collector stage for run {} finished: {} persisted, {} denied, {} failed in {:?}",
            run_id,
            summary.persisted,
            summary.denied,
            summary.failed,
            summary.elapsed
        );

        Ok(summary)
    }
}

/// Executes one (query, engine) pair end to end
///
/// Order matters: compliance first (a denied URL must never consume an
/// admission), then the throttle, then the fetch. The slot is held across
/// the fetch and persist so in-flight accounting covers the whole request.
#[allow(clippy::too_many_arguments)]
async fn collect_pair(
    run_id: Uuid,
    engine: String,
    endpoint: String,
    query: String,
    client: Client,
    gate: Arc<ComplianceGate>,
    throttle: Arc<EngineThrottle>,
    storage: StorageHandle,
    cancel: CancellationToken,
    max_results: usize,
) -> PairOutcome {
    let status = collect_pair_status(
        run_id,
        &engine,
        &endpoint,
        &query,
        &client,
        &gate,
        &throttle,
        &storage,
        &cancel,
        max_results,
    )
    .await;

    PairOutcome {
        engine,
        query,
        status,
    }
}

#[allow(clippy::too_many_arguments)]
async fn collect_pair_status(
    run_id: Uuid,
    engine: &str,
    endpoint: &str,
    query: &str,
    client: &Client,
    gate: &ComplianceGate,
    throttle: &EngineThrottle,
    storage: &StorageHandle,
    cancel: &CancellationToken,
    max_results: usize,
) -> PairStatus {
    if cancel.is_cancelled() {
        return PairStatus::Cancelled;
    }

    let url = match build_search_url(endpoint, query) {
        Ok(url) => url,
        Err(e) => {
            return PairStatus::Failed {
                error: format!("invalid search URL: {}", e),
            }
        }
    };

    match gate.ensure_permitted(&url).await {
        Ok(()) => {}
        Err(e @ ComplianceError::RobotsDisallowed { .. }) => {
            return PairStatus::Denied {
                reason: e.to_string(),
            }
        }
        Err(e) => {
            return PairStatus::Failed {
                error: e.to_string(),
            }
        }
    }

    let slot = tokio::select! {
        _ = cancel.cancelled() => return PairStatus::Cancelled,
        admitted = throttle.admit(engine) => match admitted {
            Ok(slot) => slot,
            Err(e) => {
                return PairStatus::Failed {
                    error: e.to_string(),
                }
            }
        },
    };

    let status = match fetch_serp(client, &url, max_results).await {
        FetchOutcome::Success {
            status_code,
            results,
        } => {
            let result_count = results.len();
            let record = CollectionRecord {
                run_id,
                engine: engine.to_string(),
                query: query.to_string(),
                results,
                status_code,
                collected_at: Utc::now(),
            };
            let persisted = {
                let mut storage = storage.lock().unwrap();
                storage.persist_collection_result(&record)
            };
            match persisted {
                Ok(()) => PairStatus::Persisted { result_count },
                Err(e) => PairStatus::Failed {
                    error: format!("persist failed: {}", e),
                },
            }
        }
        FetchOutcome::HttpStatus { status_code } => {
            fetch_failure(engine, query, format!("HTTP {}", status_code))
        }
        FetchOutcome::Timeout => fetch_failure(engine, query, "request timed out".to_string()),
        FetchOutcome::Network { error } => fetch_failure(engine, query, error),
    };

    drop(slot);
    status
}

/// Records a fetch-level failure as pair data, never as a run error
fn fetch_failure(engine: &str, query: &str, message: String) -> PairStatus {
    let error = SerpscopeError::EngineFetch {
        engine: engine.to_string(),
        query: query.to_string(),
        message,
    };
    PairStatus::Failed {
        error: error.to_string(),
    }
}
