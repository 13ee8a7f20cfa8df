/// Run and stage status definitions for pipeline tracking
///
/// This module defines the shared status enum for pipeline runs and their
/// stage logs, plus the fixed set of pipeline stages.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a pipeline run or stage log
///
/// Transitions are monotonic: pending → running → {completed, failed}.
/// Terminal records are never resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created but no work started yet
    Pending,

    /// Work is in progress
    Running,

    /// Finished successfully (terminal)
    Completed,

    /// Finished with an error (terminal)
    Failed,
}

impl RunStatus {
    /// Returns true if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if a record may move from `self` to `next`
    ///
    /// Only forward transitions are legal; a status never repeats and a
    /// terminal status accepts nothing.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Completed | Self::Failed),
            Self::Running => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Converts the status to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its stored string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![Self::Pending, Self::Running, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One phase of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// SERP collection across engines
    Collector,

    /// Result annotation (driven by an external collaborator)
    Annotation,

    /// Bias/accuracy metrics computation (driven by an external collaborator)
    Metrics,
}

impl Stage {
    /// Converts the stage to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Collector => "collector",
            Self::Annotation => "annotation",
            Self::Metrics => "metrics",
        }
    }

    /// Parses a stage from its stored string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "collector" => Some(Self::Collector),
            "annotation" => Some(Self::Annotation),
            "metrics" => Some(Self::Metrics),
            _ => None,
        }
    }

    /// Returns all pipeline stages in execution order
    pub fn all_stages() -> Vec<Self> {
        vec![Self::Collector, Self::Annotation, Self::Metrics]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
    }

    #[test]
    fn test_reverse_and_terminal_transitions_refused() {
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Pending));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_status_roundtrip_db_string() {
        for status in RunStatus::all_statuses() {
            let db_str = status.to_db_string();
            assert_eq!(RunStatus::from_db_string(db_str), Some(status));
        }
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_stage_roundtrip_db_string() {
        for stage in Stage::all_stages() {
            let db_str = stage.to_db_string();
            assert_eq!(Stage::from_db_string(db_str), Some(stage));
        }
        assert_eq!(Stage::from_db_string("invalid"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", RunStatus::Pending), "pending");
        assert_eq!(format!("{}", RunStatus::Completed), "completed");
        assert_eq!(format!("{}", Stage::Collector), "collector");
        assert_eq!(format!("{}", Stage::Metrics), "metrics");
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            Stage::all_stages(),
            vec![Stage::Collector, Stage::Annotation, Stage::Metrics]
        );
    }
}
