//! In-memory storage backend
//!
//! Reference implementation of the [`Storage`] trait backed by plain maps.
//! It serves the core's tests and the standalone binary; production
//! deployments inject a persistent backend implementing the same trait.

use crate::state::{
    AnnotatedResult, AnnotationAggregate, AnnotationFilter, CollectionRecord, PipelineRun,
    PipelineStageLog, Stage,
};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Map-backed storage for tests and the reference binary
#[derive(Default)]
pub struct MemoryStorage {
    runs: HashMap<Uuid, PipelineRun>,
    stages: HashMap<(Uuid, Stage), PipelineStageLog>,
    collection_results: Vec<CollectionRecord>,
    annotated_results: Vec<AnnotatedResult>,
    closed: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds annotated results, standing in for the external annotation stage
    pub fn seed_annotated_results(&mut self, results: Vec<AnnotatedResult>) {
        self.annotated_results.extend(results);
    }

    /// Total number of persisted collection results across all runs
    pub fn collection_result_count(&self) -> usize {
        self.collection_results.len()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Storage for MemoryStorage {
    fn upsert_pipeline_run(&mut self, run: &PipelineRun) -> StorageResult<()> {
        self.ensure_open()?;
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    fn upsert_pipeline_stage(&mut self, stage: &PipelineStageLog) -> StorageResult<()> {
        self.ensure_open()?;
        self.stages
            .insert((stage.run_id, stage.stage), stage.clone());
        Ok(())
    }

    fn fetch_pipeline_runs(&self, limit: usize) -> StorageResult<Vec<PipelineRun>> {
        self.ensure_open()?;
        let mut runs: Vec<PipelineRun> = self.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn fetch_pipeline_stages(&self, run_id: Uuid) -> StorageResult<Vec<PipelineStageLog>> {
        self.ensure_open()?;
        let mut stages: Vec<PipelineStageLog> = Stage::all_stages()
            .into_iter()
            .filter_map(|stage| self.stages.get(&(run_id, stage)).cloned())
            .collect();
        // all_stages() is already in execution order; keep it explicit anyway
        stages.sort_by_key(|s| Stage::all_stages().iter().position(|x| *x == s.stage));
        Ok(stages)
    }

    fn persist_collection_result(&mut self, record: &CollectionRecord) -> StorageResult<()> {
        self.ensure_open()?;
        self.collection_results.push(record.clone());
        Ok(())
    }

    fn fetch_collection_results(&self, run_id: Uuid) -> StorageResult<Vec<CollectionRecord>> {
        self.ensure_open()?;
        Ok(self
            .collection_results
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }

    fn fetch_annotated_results(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AnnotatedResult>> {
        self.ensure_open()?;
        Ok(self
            .annotated_results
            .iter()
            .filter(|r| since.map_or(true, |cutoff| r.annotated_at >= cutoff))
            .cloned()
            .collect())
    }

    fn fetch_annotation_aggregates(
        &self,
        filter: &AnnotationFilter,
    ) -> StorageResult<Vec<AnnotationAggregate>> {
        self.ensure_open()?;

        let mut sums: HashMap<Uuid, (f64, u64)> = HashMap::new();
        for result in &self.annotated_results {
            if let Some(run_id) = filter.run_id {
                if result.run_id != run_id {
                    continue;
                }
            }
            if let Some(cutoff) = filter.since {
                if result.annotated_at < cutoff {
                    continue;
                }
            }
            let entry = sums.entry(result.run_id).or_insert((0.0, 0));
            entry.0 += result.factual_consistency;
            entry.1 += 1;
        }

        let mut aggregates: Vec<AnnotationAggregate> = sums
            .into_iter()
            .map(|(run_id, (sum, count))| AnnotationAggregate {
                run_id,
                factual_consistency: sum / count as f64,
                count,
            })
            .collect();
        aggregates.sort_by_key(|a| a.run_id);
        Ok(aggregates)
    }

    fn close(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}
