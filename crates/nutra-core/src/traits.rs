//! Core traits for nutra abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;

// =============================================================================
// SUPPLEMENT STORE TRAITS
// =============================================================================

/// Repository for supplement entities (the authoritative vector store).
#[async_trait]
pub trait SupplementStore: Send + Sync {
    /// Insert a new entity, idempotent on its canonical key.
    ///
    /// A conflicting insert returns `Error::DuplicateEntity` carrying the
    /// surviving row's id so callers can treat it as success.
    async fn insert(&self, supplement: NewSupplement) -> Result<Uuid>;

    /// Cosine-similarity search over non-deleted entities embedded under
    /// the current model, ordered best-first with ties broken by higher
    /// search count. An empty result is `Ok(vec![])`.
    async fn search(
        &self,
        query_vec: &Vector,
        limit: i64,
        min_similarity: f32,
    ) -> Result<Vec<ScoredSupplement>>;

    /// Fetch an entity by id (`Error::SupplementNotFound` when absent or
    /// soft-deleted).
    async fn get(&self, id: Uuid) -> Result<SupplementEntity>;

    /// Fetch an entity by its canonical key.
    async fn get_by_canonical(&self, canonical_key: &str) -> Result<Option<SupplementEntity>>;

    /// Bump `search_count` and stamp `last_searched_at`.
    async fn record_search(&self, id: Uuid) -> Result<()>;

    /// Soft-delete an entity; read queries exclude it from then on.
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// DISCOVERY QUEUE TRAITS
// =============================================================================

/// Repository for the auto-discovery queue.
#[async_trait]
pub trait DiscoveryQueue: Send + Sync {
    /// Upsert an occurrence of `normalized_query`, atomic per key.
    ///
    /// N concurrent enqueues of one key converge on a single row with
    /// `occurrence_count` increased by N. Re-opens rejected/failed rows
    /// once their count has grown enough past the resolved count.
    async fn enqueue(&self, raw_query: &str, normalized_query: &str) -> Result<EnqueueReceipt>;

    /// Claim the highest-priority pending item, exclusive under any
    /// number of concurrent claimers. The returned item carries a fresh
    /// claim token the resolution calls must present.
    async fn claim_next(&self) -> Result<Option<DiscoveryItem>>;

    /// Terminal: entity inserted (or already present).
    async fn mark_validated(&self, id: Uuid, claim_token: Uuid, entity_id: Uuid) -> Result<()>;

    /// Terminal: no supporting evidence found.
    async fn mark_rejected(&self, id: Uuid, claim_token: Uuid, reason: &str) -> Result<()>;

    /// Terminal: retry budget exhausted.
    async fn mark_failed(&self, id: Uuid, claim_token: Uuid, error: &str) -> Result<()>;

    /// Return the item to pending with an incremented attempt count and
    /// the given earliest next-attempt time.
    async fn release_for_retry(
        &self,
        id: Uuid,
        claim_token: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Revert processing items whose claim has outlived `lease` back to
    /// pending (attempt budget unchanged). Returns how many were reaped.
    async fn release_expired(&self, lease: Duration) -> Result<u64>;

    /// Per-status queue counts.
    async fn stats(&self) -> Result<QueueStats>;

    /// List recent items, optionally filtered by status.
    async fn list(&self, status: Option<DiscoveryStatus>, limit: i64) -> Result<Vec<DiscoveryItem>>;

    /// Get an item by id.
    async fn get(&self, id: Uuid) -> Result<Option<DiscoveryItem>>;

    /// Count of pending items.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text. Any
    /// transport, decode, or dimension failure is
    /// `Error::EmbeddingUnavailable`; callers must not cache it as a
    /// verdict about the input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("backend returned no vectors".into()))
    }

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;

    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// CACHE TRAITS
// =============================================================================

/// One cache tier in the lookup hierarchy.
///
/// Implementations are volatile accelerators: correctness never depends
/// on their contents, and callers treat every error as a degraded tier
/// rather than a failed lookup.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the cached verdict for a key, `None` on absence or expiry.
    async fn get(&self, key: &str) -> Result<Option<CachedLookup>>;

    /// Store a verdict under a key with the given time-to-live.
    async fn set(&self, key: &str, value: &CachedLookup, ttl: Duration) -> Result<()>;

    /// Drop a key if present.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Which tier this store is.
    fn tier(&self) -> CacheTier;
}

// =============================================================================
// LITERATURE AUTHORITY TRAITS
// =============================================================================

/// External authority consulted to validate a discovery candidate.
#[async_trait]
pub trait LiteratureAuthority: Send + Sync {
    /// Number of published studies mentioning `term`.
    ///
    /// Zero evidence is `Ok(0)`; only transport-level failures are `Err`.
    async fn evidence_count(&self, term: &str) -> Result<i64>;
}
