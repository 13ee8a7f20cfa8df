//! Pipeline run tracking
//!
//! [`PipelineRunTracker`] is the single writer for pipeline run and stage
//! records. Callers request transitions through its contract; direct record
//! mutation happens nowhere else. Every mutation is mirrored to the storage
//! collaborator so the dashboard sees live state.
//!
//! Transition rules:
//! - Runs move pending → running → {completed, failed}, never backwards
//! - Terminal records refuse all further transitions
//! - `begin_stage` is the retry entry point: it re-opens a failed stage and
//!   increments its attempt count; completed stages stay closed

use crate::state::{PipelineRun, PipelineStageLog, RunStatus, Stage};
use crate::storage::{Storage, StorageError, StorageHandle};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by tracker operations
///
/// An invalid transition is a contract violation by the caller, not a
/// runtime condition to recover from; it should be treated as fatal.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid transition for {subject}: {from} -> {to}")]
    InvalidTransition {
        subject: String,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("No {stage} stage log for run {run_id}")]
    StageNotFound { run_id: Uuid, stage: Stage },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Default)]
struct TrackerState {
    runs: HashMap<Uuid, PipelineRun>,
    stages: HashMap<(Uuid, Stage), PipelineStageLog>,
}

/// State machine over pipeline runs and their stage logs
///
/// Mutations for any given record are serialized behind one lock, so
/// concurrent `begin_stage`/`complete_stage` calls for the same key never
/// race. The tracker holds the authoritative copy; storage rows are a
/// write-through mirror.
pub struct PipelineRunTracker {
    storage: StorageHandle,
    state: Mutex<TrackerState>,
}

impl PipelineRunTracker {
    /// Creates a tracker writing through to the given storage handle
    pub fn new(storage: StorageHandle) -> Self {
        Self {
            storage,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Creates a new run in status `pending`
    pub fn create_run(&self, metadata: HashMap<String, Value>) -> TrackerResult<PipelineRun> {
        let run = PipelineRun::new(metadata);

        let mut state = self.state.lock().unwrap();
        state.runs.insert(run.id, run.clone());
        self.persist_run(&run)?;

        tracing::info!("Created pipeline run {}", run.id);
        Ok(run)
    }

    /// Returns a snapshot of a run
    pub fn get_run(&self, id: Uuid) -> TrackerResult<PipelineRun> {
        let state = self.state.lock().unwrap();
        state
            .runs
            .get(&id)
            .cloned()
            .ok_or(TrackerError::RunNotFound(id))
    }

    /// Returns a snapshot of a stage log, if one exists
    pub fn get_stage(&self, run_id: Uuid, stage: Stage) -> Option<PipelineStageLog> {
        let state = self.state.lock().unwrap();
        state.stages.get(&(run_id, stage)).cloned()
    }

    /// Transitions a run to a new status
    ///
    /// Terminal statuses stamp `completed_at`; entering `running` stamps
    /// `started_at`. Fails with [`TrackerError::InvalidTransition`] for
    /// backwards moves and for any transition out of a terminal status.
    pub fn transition_run(
        &self,
        id: Uuid,
        status: RunStatus,
        error: Option<String>,
    ) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        let run = state
            .runs
            .get_mut(&id)
            .ok_or(TrackerError::RunNotFound(id))?;

        if !run.status.can_transition_to(status) {
            return Err(TrackerError::InvalidTransition {
                subject: format!("run {}", id),
                from: run.status,
                to: status,
            });
        }

        let now = Utc::now();
        run.status = status;
        run.updated_at = now;
        if status == RunStatus::Running {
            run.started_at = Some(now);
        }
        if status.is_terminal() {
            run.completed_at = Some(now);
            run.error = error;
        } else if let Some(message) = error {
            run.error = Some(message);
        }

        let snapshot = run.clone();
        self.persist_run(&snapshot)?;

        tracing::info!("Run {} transitioned to {}", id, status);
        Ok(())
    }

    /// Opens (or re-opens) a stage log for a new attempt
    ///
    /// First call for (run, stage) creates the log with `attempts = 1` in
    /// status `running`. Later calls increment `attempts` and reset the log
    /// to `running`; that is the external retry path for failed stages.
    /// A `completed` stage is closed for good and fails the call.
    pub fn begin_stage(&self, run_id: Uuid, stage: Stage) -> TrackerResult<PipelineStageLog> {
        let mut state = self.state.lock().unwrap();

        if !state.runs.contains_key(&run_id) {
            return Err(TrackerError::RunNotFound(run_id));
        }

        let log = match state.stages.get_mut(&(run_id, stage)) {
            None => {
                let log = PipelineStageLog::first_attempt(run_id, stage);
                state.stages.insert((run_id, stage), log.clone());
                log
            }
            Some(existing) => {
                if existing.status == RunStatus::Completed {
                    return Err(TrackerError::InvalidTransition {
                        subject: format!("stage {} of run {}", stage, run_id),
                        from: existing.status,
                        to: RunStatus::Running,
                    });
                }

                let now = Utc::now();
                existing.attempts += 1;
                existing.status = RunStatus::Running;
                existing.started_at = Some(now);
                existing.completed_at = None;
                existing.error = None;
                existing.updated_at = now;
                existing.clone()
            }
        };

        self.persist_stage(&log)?;

        tracing::info!(
            "Stage {} of run {} began attempt {}",
            stage,
            run_id,
            log.attempts
        );
        Ok(log)
    }

    /// Closes a stage log with a terminal status
    ///
    /// Fails if the stage log does not exist, if `status` is not terminal,
    /// or if the stage already reached a terminal status.
    pub fn complete_stage(
        &self,
        run_id: Uuid,
        stage: Stage,
        status: RunStatus,
        error: Option<String>,
    ) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        let log = state
            .stages
            .get_mut(&(run_id, stage))
            .ok_or(TrackerError::StageNotFound { run_id, stage })?;

        if !status.is_terminal() || !log.status.can_transition_to(status) {
            return Err(TrackerError::InvalidTransition {
                subject: format!("stage {} of run {}", stage, run_id),
                from: log.status,
                to: status,
            });
        }

        let now = Utc::now();
        log.status = status;
        log.completed_at = Some(now);
        log.updated_at = now;
        log.error = error;

        let snapshot = log.clone();
        self.persist_stage(&snapshot)?;

        tracing::info!("Stage {} of run {} finished as {}", stage, run_id, status);
        Ok(())
    }

    fn persist_run(&self, run: &PipelineRun) -> TrackerResult<()> {
        let mut storage = self.storage.lock().unwrap();
        storage.upsert_pipeline_run(run)?;
        Ok(())
    }

    fn persist_stage(&self, stage: &PipelineStageLog) -> TrackerResult<()> {
        let mut storage = self.storage.lock().unwrap();
        storage.upsert_pipeline_stage(stage)?;
        Ok(())
    }
}
