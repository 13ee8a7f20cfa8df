//! Compliance gate for collection requests
//!
//! Every collection request passes through [`ComplianceGate`] before it is
//! dispatched. The gate resolves the target's robots.txt rules through the
//! shared [`RobotsCache`] and refuses URLs whose path matches a recorded
//! disallow prefix.

use crate::config::CollectorConfig;
use crate::robots::RobotsCache;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Errors produced by a compliance check
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// robots.txt explicitly forbids this path; never retried automatically
    #[error("robots.txt disallows {url} (matched prefix {prefix:?})")]
    RobotsDisallowed { url: String, prefix: String },

    /// The URL cannot be checked because it has no host component
    #[error("URL {url} has no host to resolve robots.txt for")]
    MissingHost { url: String },
}

/// Transient result of a single compliance check
///
/// Produced and consumed within one request's lifetime; never persisted.
#[derive(Debug, Clone)]
pub struct ComplianceDecision {
    pub permitted: bool,
    pub reason: Option<String>,
}

/// Permit/deny gate consulted before every collection request
pub struct ComplianceGate {
    cache: RobotsCache,
    respect_robots: bool,
    user_agent: String,
}

impl ComplianceGate {
    /// Creates a gate from the collector configuration
    ///
    /// The gate owns its robots cache; `client` is the shared HTTP client
    /// used for robots.txt fetches.
    pub fn new(config: &CollectorConfig, client: Client) -> Self {
        Self {
            cache: RobotsCache::new(client, config.robots_cache_ttl_ms),
            respect_robots: config.respect_robots,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Checks whether `url` may be fetched
    ///
    /// Returns normally on permit. Fails with
    /// [`ComplianceError::RobotsDisallowed`] when a disallow prefix matches.
    /// A robots.txt transport failure is logged as a warning and treated as
    /// permit-all: politeness favors availability over stalling collection.
    pub async fn ensure_permitted(&self, url: &Url) -> Result<(), ComplianceError> {
        if !self.respect_robots {
            return Ok(());
        }

        if url.host_str().is_none() {
            return Err(ComplianceError::MissingHost {
                url: url.to_string(),
            });
        }

        let record = match self.cache.get_rules(url).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("{}; permitting {} without robots rules", e, url);
                return Ok(());
            }
        };

        if let Some(prefix) = record.disallowed_prefix(url.path(), &self.user_agent) {
            return Err(ComplianceError::RobotsDisallowed {
                url: url.to_string(),
                prefix: prefix.to_string(),
            });
        }

        Ok(())
    }

    /// Runs the same check but reports a [`ComplianceDecision`] instead of
    /// an error, for callers that record denials as data rather than failures
    pub async fn check(&self, url: &Url) -> ComplianceDecision {
        match self.ensure_permitted(url).await {
            Ok(()) => ComplianceDecision {
                permitted: true,
                reason: None,
            },
            Err(e) => ComplianceDecision {
                permitted: false,
                reason: Some(e.to_string()),
            },
        }
    }

    /// Number of hosts with cached robots rules
    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }
}
