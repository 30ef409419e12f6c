//! Structured logging schema and field name constants for nutra.
//!
//! All crates use these constants for consistent structured logging fields.
//! This ensures log aggregation tools (Loki, Elasticsearch) can query by
//! standardized field names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (search hits, variants) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → discovery → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "inference", "evidence", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "router", "tier1", "tier2", "ollama", "pubmed", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "lookup", "embed_texts", "enqueue", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Supplement entity UUID being operated on.
pub const ENTITY_ID: &str = "entity_id";

/// Discovery queue item UUID being processed.
pub const ITEM_ID: &str = "item_id";

/// Raw search query text.
pub const QUERY: &str = "query";

/// Normalized query key.
pub const NORMALIZED_QUERY: &str = "normalized_query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Occurrence count carried by a queue item.
pub const OCCURRENCE_COUNT: &str = "occurrence_count";

/// Study count reported by the literature authority.
pub const STUDY_COUNT: &str = "study_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

// ─── Cache fields ──────────────────────────────────────────────────────────

/// Tier that served (or failed) a cache operation.
pub const CACHE_TIER: &str = "cache_tier";

/// Hashed cache key for an operation.
pub const CACHE_KEY: &str = "cache_key";

// ─── Database fields ───────────────────────────────────────────────────────

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for embedding.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
