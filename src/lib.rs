//! Serpscope: a compliance-gated SERP collection monitor
//!
//! This crate implements the collection core of a search-result monitoring
//! pipeline: it fans a query set out across multiple configured engines,
//! checking robots.txt permission and per-engine rate budgets before every
//! request, and records run/stage progress in an auditable state machine.

pub mod collector;
pub mod compliance;
pub mod config;
pub mod robots;
pub mod state;
pub mod storage;
pub mod throttle;
pub mod tracker;

use thiserror::Error;

/// Main error type for serpscope operations
#[derive(Debug, Error)]
pub enum SerpscopeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Compliance error: {0}")]
    Compliance(#[from] compliance::ComplianceError),

    #[error("Throttle error: {0}")]
    Throttle(#[from] throttle::ThrottleError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] tracker::TrackerError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Run {run_id} cancelled: {reason}")]
    RunCancelled { run_id: uuid::Uuid, reason: String },

    #[error("engine fetch failed: {message}")]
    EngineFetch {
        engine: String,
        query: String,
        message: String,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for serpscope operations
pub type Result<T> = std::result::Result<T, SerpscopeError>;

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use collector::{CollectionScheduler, CollectionSummary};
pub use compliance::ComplianceGate;
pub use config::Config;
pub use robots::RobotsCache;
pub use state::{RunStatus, Stage};
pub use throttle::EngineThrottle;
pub use tracker::PipelineRunTracker;
