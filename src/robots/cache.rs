//! Robots.txt fetching and caching
//!
//! This module owns the per-host robots.txt cache. Entries carry the parsed
//! record and a fetch timestamp; staleness is checked against the configured
//! TTL on every lookup rather than by a background timer.

use crate::robots::parser::RobotsRecord;
use crate::robots::ComplianceFetchError;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// Cached robots.txt data for one host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt rules
    pub record: RobotsRecord,

    /// When the robots.txt fetch completed
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new cache entry stamped with the current time
    pub fn new(record: RobotsRecord) -> Self {
        Self {
            record,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if this entry has outlived the given TTL
    pub fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }

    /// Returns the age of this entry
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Per-host robots.txt cache with TTL expiry
///
/// The cache exclusively owns its entries: lookups return a clone of the
/// parsed record, and refreshes replace an entry wholesale. Entries are keyed
/// by URL origin (scheme + host + port) so two servers on the same host but
/// different ports never share rules.
pub struct RobotsCache {
    client: Client,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    /// Creates a cache using the given HTTP client and TTL in milliseconds
    pub fn new(client: Client, ttl_ms: u64) -> Self {
        Self {
            client,
            ttl: Duration::milliseconds(ttl_ms as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the robots rules governing `url`'s host
    ///
    /// On a cache miss or an expired entry this fetches
    /// `{scheme}://{host}/robots.txt`. A non-2xx response (typically 404)
    /// synthesizes a permit-all record, cached for the full TTL. A transport
    /// failure is returned as [`ComplianceFetchError`]; policy for that case
    /// belongs to the caller.
    pub async fn get_rules(&self, url: &Url) -> Result<RobotsRecord, ComplianceFetchError> {
        let origin = url.origin().ascii_serialization();

        {
            let entries = self.entries.lock().expect("robots cache lock poisoned");
            if let Some(cached) = entries.get(&origin) {
                if !cached.is_stale(self.ttl) {
                    return Ok(cached.record.clone());
                }
                tracing::debug!(
                    "robots.txt for {} is stale (age {:?}), refetching",
                    origin,
                    cached.age()
                );
            }
        }

        let record = self.fetch(&origin).await?;

        let mut entries = self.entries.lock().expect("robots cache lock poisoned");
        entries.insert(origin, CachedRobots::new(record.clone()));

        Ok(record)
    }

    /// Number of cached hosts, fresh or stale
    pub fn len(&self) -> usize {
        self.entries.lock().expect("robots cache lock poisoned").len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn fetch(&self, origin: &str) -> Result<RobotsRecord, ComplianceFetchError> {
        let robots_url = format!("{}/robots.txt", origin);
        tracing::debug!("Fetching robots.txt from {}", robots_url);

        let response = self
            .client
            .get(&robots_url)
            .send()
            .await
            .map_err(|source| ComplianceFetchError {
                url: robots_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            // No robots.txt (404) and other non-2xx answers mean no restrictions
            tracing::debug!(
                "robots.txt at {} answered {}, treating host as unrestricted",
                robots_url,
                status
            );
            return Ok(RobotsRecord::permit_all());
        }

        let body = response
            .text()
            .await
            .map_err(|source| ComplianceFetchError {
                url: robots_url,
                source,
            })?;

        Ok(RobotsRecord::parse(&body))
    }
}
