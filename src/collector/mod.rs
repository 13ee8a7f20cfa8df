//! Collection module for multi-engine SERP gathering
//!
//! This module contains the collection core:
//! - HTTP fetching with outcome classification
//! - Concurrent (query, engine) pair scheduling through compliance and
//!   throttle
//! - Summary aggregation for reporting and stage bookkeeping

mod fetcher;
mod scheduler;
mod summary;

pub use fetcher::{build_http_client, build_search_url, extract_results, fetch_serp, FetchOutcome};
pub use scheduler::CollectionScheduler;
pub use summary::{CollectionSummary, PairOutcome, PairStatus};
