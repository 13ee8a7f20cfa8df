//! HTTP fetching for collection requests
//!
//! This module builds the shared HTTP client and performs the actual SERP
//! fetches. Result payloads are treated as opaque: a JSON body is split
//! into entries so the per-query cap can apply, but nothing inspects their
//! shape beyond that.

use crate::config::CollectorConfig;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Result of one collection fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// The engine answered 2xx; entries are capped at the configured maximum
    Success {
        status_code: u16,
        results: Vec<Value>,
    },

    /// The engine answered with a non-2xx status
    HttpStatus { status_code: u16 },

    /// The request timed out (transient; never fatal to the run)
    Timeout,

    /// Transport-level failure (connection refused, TLS, DNS, ...)
    Network { error: String },
}

/// Builds the HTTP client shared by robots and collection fetches
///
/// # Arguments
///
/// * `config` - The collector configuration (user agent, timeout, proxy)
pub fn build_http_client(config: &CollectorConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy_url) = &config.proxy_url {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Expands an engine's endpoint template into a concrete search URL
///
/// The `{query}` placeholder is replaced with the percent-encoded query.
pub fn build_search_url(endpoint: &str, query: &str) -> Result<Url, url::ParseError> {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    Url::parse(&endpoint.replace("{query}", &encoded))
}

/// Fetches one SERP and classifies the outcome
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `url` - The expanded search URL
/// * `max_results` - Cap applied to the extracted result entries
pub async fn fetch_serp(client: &Client, url: &Url, max_results: usize) -> FetchOutcome {
    match client.get(url.clone()).send().await {
        Ok(response) => {
            let status = response.status();
            if !status.is_success() {
                return FetchOutcome::HttpStatus {
                    status_code: status.as_u16(),
                };
            }

            match response.text().await {
                Ok(body) => FetchOutcome::Success {
                    status_code: status.as_u16(),
                    results: extract_results(&body, max_results),
                },
                Err(e) => FetchOutcome::Network {
                    error: e.to_string(),
                },
            }
        }
        Err(e) => {
            if e.is_timeout() {
                FetchOutcome::Timeout
            } else {
                FetchOutcome::Network {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Splits a response body into result entries and applies the cap
///
/// A JSON array becomes its elements; a JSON object contributes its
/// `results` array when present, otherwise the object itself as a single
/// entry. Anything unparseable is kept whole as one opaque string entry.
pub fn extract_results(body: &str, max_results: usize) -> Vec<Value> {
    let mut results = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(entries)) => entries,
        Ok(Value::Object(mut object)) => match object.remove("results") {
            Some(Value::Array(entries)) => entries,
            Some(other) => vec![other],
            None => vec![Value::Object(object)],
        },
        Ok(other) => vec![other],
        Err(_) => vec![Value::String(body.to_string())],
    };

    results.truncate(max_results);
    results
}
