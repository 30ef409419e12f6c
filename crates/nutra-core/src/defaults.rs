//! Centralized default constants for the nutra system.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// SEARCH
// =============================================================================

/// Default number of results returned by a search.
pub const SEARCH_LIMIT: i64 = 5;

/// Maximum number of results a caller may request.
pub const SEARCH_LIMIT_MAX: i64 = 20;

/// Maximum query length in characters (after normalization).
pub const QUERY_MAX_CHARS: usize = 200;

/// Minimum cosine similarity for a vector search match.
///
/// 0.85 keeps false positives out of the supplement domain, where
/// embeddings of unrelated compounds still land fairly close together.
pub const MIN_SIMILARITY: f32 = 0.85;

// =============================================================================
// CACHE TIERS
// =============================================================================

/// Tier 1 (in-process LRU) capacity in entries.
pub const TIER1_CAPACITY: usize = 1024;

/// Tier 1 positive-entry TTL in seconds (5 minutes).
pub const TIER1_TTL_SECS: u64 = 300;

/// Tier 2 (Redis) positive-entry TTL in seconds (7 days).
pub const TIER2_TTL_SECS: u64 = 604_800;

/// TTL for negative markers in seconds (5 minutes).
///
/// Short on purpose: a not-found verdict can be overturned by the
/// discovery pipeline at any moment.
pub const NEGATIVE_TTL_SECS: u64 = 300;

/// Budget for a Tier 2 round trip in milliseconds before the lookup
/// falls through to Tier 3.
pub const TIER2_TIMEOUT_MS: u64 = 250;

/// Key prefix for Tier 2 cache entries.
pub const CACHE_PREFIX: &str = "nutra:search:";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

// =============================================================================
// DISCOVERY QUEUE
// =============================================================================

/// Maximum resolution attempts before an item is marked failed.
pub const DISCOVERY_MAX_ATTEMPTS: i32 = 3;

/// Lease duration in seconds before a processing item is considered
/// abandoned and returned to pending.
pub const DISCOVERY_LEASE_SECS: u64 = 300;

/// Discovery worker safety-net poll interval in milliseconds.
///
/// With event-driven waking the worker sleeps until notified. This
/// interval only covers edge cases (crash recovery, external SQL
/// inserts, races between notify and claim).
pub const DISCOVERY_POLL_INTERVAL_MS: u64 = 15_000;

/// Default maximum concurrent resolutions per worker.
pub const DISCOVERY_MAX_CONCURRENT: usize = 2;

/// Per-item resolution timeout in seconds.
pub const DISCOVERY_ITEM_TIMEOUT_SECS: u64 = 120;

/// Occurrence growth past the resolved count that re-opens a rejected
/// or failed item for another attempt.
pub const REQUEUE_OCCURRENCE_DELTA: i64 = 10;

/// Worker broadcast event channel capacity.
pub const WORKER_EVENT_CAPACITY: usize = 256;

// =============================================================================
// RETRY BACKOFF
// =============================================================================

/// Base delay for the first retry in seconds.
pub const BACKOFF_BASE_SECS: u64 = 60;

/// Ceiling on any computed retry delay in seconds (1 hour).
pub const BACKOFF_CAP_SECS: u64 = 3600;

// =============================================================================
// PRIORITY LEVELS
// =============================================================================

/// Occurrence count at which a queue item reports high priority.
pub const PRIORITY_HIGH_OCCURRENCE: i64 = 10;

/// Occurrence count at which a queue item reports medium priority.
pub const PRIORITY_MEDIUM_OCCURRENCE: i64 = 3;

// =============================================================================
// EVIDENCE GRADING
// =============================================================================

/// Study count at or above which evidence is graded A.
pub const EVIDENCE_GRADE_A_STUDIES: i64 = 100;

/// Study count at or above which evidence is graded B.
pub const EVIDENCE_GRADE_B_STUDIES: i64 = 50;

/// Study count at or above which evidence is graded C. Below this the
/// grade is D.
pub const EVIDENCE_GRADE_C_STUDIES: i64 = 10;

// =============================================================================
// LITERATURE AUTHORITY (PUBMED)
// =============================================================================

/// Default PubMed E-utilities base URL.
pub const PUBMED_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Timeout for literature lookups in seconds.
pub const PUBMED_TIMEOUT_SECS: u64 = 10;

/// Maximum requests per second against the E-utilities endpoint
/// (the documented courtesy limit without an API key).
pub const PUBMED_MAX_RPS: u32 = 3;
