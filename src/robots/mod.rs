//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. Every collection request is checked against these rules
//! before it is dispatched.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::{RobotsRecord, RuleGroup};

use thiserror::Error;

/// A robots.txt fetch failed at the transport level
///
/// Non-2xx responses are not errors (they synthesize permit-all records);
/// this covers connection, TLS, and timeout failures only.
#[derive(Debug, Error)]
#[error("Failed to fetch robots.txt from {url}: {source}")]
pub struct ComplianceFetchError {
    /// The robots.txt URL that was being fetched
    pub url: String,

    /// The underlying transport error
    pub source: reqwest::Error,
}
