//! Record types shared between the tracker, scheduler, and storage layers

use crate::state::{RunStatus, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One end-to-end pipeline run (collection → annotation → metrics)
///
/// Created and mutated exclusively by the tracker; everyone else sees
/// snapshots. `completed_at` is set iff the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Open key/value bag (config hash, query counts, operator notes, ...)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PipelineRun {
    /// Creates a fresh pending run
    pub fn new(metadata: HashMap<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            created_at: now,
            updated_at: now,
            metadata,
        }
    }
}

/// Progress log for one stage of one run
///
/// `attempts` counts invocations of the stage, incremented on every retry;
/// it is at least 1 from the moment the status leaves pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStageLog {
    pub run_id: Uuid,
    pub stage: Stage,
    pub status: RunStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineStageLog {
    /// Creates a stage log for its first attempt, already running
    pub fn first_attempt(run_id: Uuid, stage: Stage) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            stage,
            status: RunStatus::Running,
            attempts: 1,
            started_at: Some(now),
            completed_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The persisted payload for one successful (query, engine) collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub run_id: Uuid,
    pub engine: String,
    pub query: String,
    /// Result entries as returned by the engine, capped at the configured
    /// per-query maximum; the core treats their shape as opaque
    pub results: Vec<serde_json::Value>,
    pub status_code: u16,
    pub collected_at: DateTime<Utc>,
}

/// An annotated result read back from the storage collaborator
///
/// Produced by the external annotation stage; the core only defines the
/// shape it consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedResult {
    pub id: Uuid,
    pub run_id: Uuid,
    pub engine: String,
    pub query: String,
    pub url: String,
    pub factual_consistency: f64,
    pub annotated_at: DateTime<Utc>,
}

/// Aggregated annotation scores for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationAggregate {
    pub run_id: Uuid,
    pub factual_consistency: f64,
    pub count: u64,
}

/// Filter for annotation aggregate queries
#[derive(Debug, Clone, Default)]
pub struct AnnotationFilter {
    pub run_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
}
