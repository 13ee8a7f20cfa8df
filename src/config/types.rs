use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for serpscope
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub collector: CollectorConfig,
    /// Query set the scheduler fans out across all enabled engines
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub engines: BTreeMap<String, EngineConfig>,
}

/// Collection behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Whether to check robots.txt before every collection request
    #[serde(rename = "respect-robots", default = "default_respect_robots")]
    pub respect_robots: bool,

    /// How long a fetched robots.txt stays valid (milliseconds)
    #[serde(rename = "robots-cache-ttl-ms", default = "default_robots_ttl")]
    pub robots_cache_ttl_ms: u64,

    /// User agent string sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Optional HTTP proxy for all outbound requests
    #[serde(rename = "proxy-url", default)]
    pub proxy_url: Option<String>,

    /// Cap on result entries persisted per (query, engine) pair
    #[serde(rename = "max-results-per-query")]
    pub max_results_per_query: usize,

    /// Per-request timeout covering robots and collection fetches (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Optional run-wide deadline; past it, no new requests are admitted
    #[serde(rename = "run-deadline-ms", default)]
    pub run_deadline_ms: Option<u64>,
}

/// Per-engine collection budget
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Disabled engines are never dispatched to
    pub enabled: bool,

    /// Maximum simultaneous in-flight requests for this engine
    pub concurrency: u32,

    /// Minimum spacing between successive request starts (milliseconds)
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    /// Search endpoint template; `{query}` is replaced with the encoded query
    pub endpoint: String,
}

impl EngineConfig {
    /// An engine takes part in collection only when enabled with a nonzero budget
    pub fn is_collectable(&self) -> bool {
        self.enabled && self.concurrency > 0
    }
}

fn default_respect_robots() -> bool {
    true
}

fn default_robots_ttl() -> u64 {
    // Daily refresh
    86_400_000
}

fn default_request_timeout() -> u64 {
    30_000
}
