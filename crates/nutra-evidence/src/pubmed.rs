//! PubMed E-utilities literature authority.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use nutra_core::{Error, LiteratureAuthority, Result};

/// Default E-utilities endpoint.
pub const DEFAULT_PUBMED_BASE_URL: &str = nutra_core::defaults::PUBMED_BASE_URL;

/// Timeout for esearch requests (seconds).
pub const PUBMED_TIMEOUT_SECS: u64 = nutra_core::defaults::PUBMED_TIMEOUT_SECS;

/// Courtesy request rate without an API key (requests per second).
pub const DEFAULT_MAX_RPS: u32 = nutra_core::defaults::PUBMED_MAX_RPS;

/// Client-side rate limiter type (direct quota, one shared bucket).
type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// PubMed-backed implementation of [`LiteratureAuthority`].
pub struct PubMedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: DirectRateLimiter,
    timeout_secs: u64,
}

impl PubMedClient {
    /// Create a new PubMed client with default settings.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_PUBMED_BASE_URL.to_string(), None, DEFAULT_MAX_RPS)
    }

    /// Create a new PubMed client with custom configuration.
    pub fn with_config(base_url: String, api_key: Option<String>, max_rps: u32) -> Self {
        let timeout_secs = std::env::var("PUBMED_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(nutra_core::defaults::PUBMED_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let rps = NonZeroU32::new(max_rps).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rps));

        info!(
            "Initializing PubMed client: url={}, api_key={}, max_rps={}",
            base_url,
            api_key.is_some(),
            rps
        );

        Self {
            client,
            base_url,
            api_key,
            limiter,
            timeout_secs,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("PUBMED_BASE_URL").unwrap_or_else(|_| DEFAULT_PUBMED_BASE_URL.to_string());
        let api_key = std::env::var("PUBMED_API_KEY").ok().filter(|k| !k.is_empty());
        let max_rps = std::env::var("PUBMED_MAX_RPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_RPS);

        Self::with_config(base_url, api_key, max_rps)
    }
}

impl Default for PubMedClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the esearch term for a supplement name.
///
/// The phrase is quoted and scoped to title/abstract, then restricted to
/// supplement literature so generic words do not validate.
fn build_term(term: &str) -> String {
    format!(
        "\"{}\"[Title/Abstract] AND (supplement OR supplementation)",
        term
    )
}

#[derive(Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Deserialize)]
struct EsearchResult {
    count: String,
}

#[async_trait]
impl LiteratureAuthority for PubMedClient {
    #[instrument(skip(self, term), fields(subsystem = "evidence", component = "pubmed", op = "evidence_count", term = %term))]
    async fn evidence_count(&self, term: &str) -> Result<i64> {
        // One shared bucket keeps every caller inside the courtesy limit
        self.limiter.until_ready().await;

        let start = Instant::now();

        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", build_term(term)),
            ("retmode", "json".to_string()),
            ("retmax", "0".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let response = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::Request(format!("PubMed request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "PubMed returned {}: {}",
                status, body
            )));
        }

        let result: EsearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Request(format!("Failed to parse esearch response: {}", e)))?;

        // E-utilities returns the count as a JSON string
        let count: i64 = result.esearchresult.count.parse().map_err(|_| {
            Error::Request(format!(
                "Unparseable esearch count: {}",
                result.esearchresult.count
            ))
        })?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            study_count = count,
            duration_ms = elapsed,
            "Evidence lookup complete"
        );
        if elapsed > 5000 {
            warn!(
                duration_ms = elapsed,
                slow = true,
                "Slow evidence lookup"
            );
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        assert_eq!(
            DEFAULT_PUBMED_BASE_URL,
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils"
        );
        assert_eq!(PUBMED_TIMEOUT_SECS, 10);
        assert_eq!(DEFAULT_MAX_RPS, 3);
    }

    #[test]
    fn test_build_term_quotes_phrase() {
        let term = build_term("lions mane");
        assert!(term.starts_with("\"lions mane\"[Title/Abstract]"));
        assert!(term.contains("AND (supplement OR supplementation)"));
    }

    #[test]
    fn test_default_config() {
        let client = PubMedClient::new();
        assert_eq!(client.base_url, DEFAULT_PUBMED_BASE_URL);
        assert!(client.api_key.is_none());
    }

    #[test]
    fn test_custom_config() {
        let client = PubMedClient::with_config(
            "http://localhost:9999".to_string(),
            Some("secret".to_string()),
            10,
        );
        assert_eq!(client.base_url, "http://localhost:9999");
        assert_eq!(client.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_zero_rps_clamps_to_one() {
        // Must not panic; the limiter falls back to 1 req/s
        let _client = PubMedClient::with_config("http://localhost".to_string(), None, 0);
    }

    #[test]
    fn test_esearch_response_deserialization() {
        let json = r#"{"esearchresult": {"count": "1542", "retmax": "0"}}"#;
        let response: EsearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.esearchresult.count, "1542");
    }
}
