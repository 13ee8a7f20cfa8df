//! Storage traits and error types
//!
//! This module defines the trait interface the core expects from the
//! persistent store. The store itself (schema, transport, connection
//! lifecycle) is an external collaborator; the core only calls this
//! contract through an injected handle and never owns a global instance.

use crate::state::{
    AnnotatedResult, AnnotationAggregate, AnnotationFilter, CollectionRecord, PipelineRun,
    PipelineStageLog,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Storage handle already closed")]
    Closed,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Implementations are driven through an `Arc<Mutex<dyn Storage + Send>>`
/// handle, so methods take `&mut self` and may assume exclusive access for
/// the duration of a call.
pub trait Storage {
    // ===== Pipeline Run Tracking =====

    /// Inserts or replaces a pipeline run row
    ///
    /// The tracker mirrors every run mutation through this method.
    fn upsert_pipeline_run(&mut self, run: &PipelineRun) -> StorageResult<()>;

    /// Inserts or replaces a stage log row for (run, stage)
    fn upsert_pipeline_stage(&mut self, stage: &PipelineStageLog) -> StorageResult<()>;

    /// Fetches the most recent pipeline runs, newest first
    fn fetch_pipeline_runs(&self, limit: usize) -> StorageResult<Vec<PipelineRun>>;

    /// Fetches all stage logs belonging to a run, in stage order
    fn fetch_pipeline_stages(&self, run_id: Uuid) -> StorageResult<Vec<PipelineStageLog>>;

    // ===== Collection Results =====

    /// Persists one (query, engine) collection result
    fn persist_collection_result(&mut self, record: &CollectionRecord) -> StorageResult<()>;

    /// Fetches all collection results recorded for a run
    fn fetch_collection_results(&self, run_id: Uuid) -> StorageResult<Vec<CollectionRecord>>;

    // ===== Annotation Readback =====

    /// Fetches annotated results, optionally restricted to newer entries
    fn fetch_annotated_results(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AnnotatedResult>>;

    /// Fetches per-run annotation aggregates matching the filter
    fn fetch_annotation_aggregates(
        &self,
        filter: &AnnotationFilter,
    ) -> StorageResult<Vec<AnnotationAggregate>>;

    // ===== Lifecycle =====

    /// Releases the backend; every later call fails with [`StorageError::Closed`]
    fn close(&mut self) -> StorageResult<()>;
}
