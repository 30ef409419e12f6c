//! Cache tier manager: Tier 1 (LRU) -> Tier 2 (Redis) -> Tier 3 (store).
//!
//! Tiers 1 and 2 are volatile accelerators holding only the best hit for
//! a normalized query (or a short-lived negative marker). Tier 3 is the
//! authoritative vector search: embed the query, search the store, and
//! backfill the tiers above. Every tier failure degrades the walk rather
//! than the lookup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use nutra_core::{
    defaults, CacheStore, CacheTier, CachedLookup, EmbeddingBackend, ScoredSupplement,
    SupplementStore,
};

/// Derive the shared cache key for a normalized query.
///
/// Both volatile tiers use the same key so one `invalidate` clears them
/// together. Hashing keeps arbitrary user text out of Redis keyspaces.
pub fn cache_key(normalized_query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_query.as_bytes());
    let hash = hex::encode(hasher.finalize());
    format!("{}{}", defaults::CACHE_PREFIX, &hash[..16])
}

/// Outcome of a tiered lookup.
#[derive(Debug, Clone)]
pub enum TierLookup {
    /// An entity matched, served from `tier`.
    Hit {
        best: ScoredSupplement,
        /// Matches beyond the best one; only a Tier 3 search produces them.
        alternatives: Vec<ScoredSupplement>,
        tier: CacheTier,
    },
    /// No entity matched.
    ///
    /// Definitive when the store itself answered (directly or through a
    /// cached negative marker). Non-definitive when Tier 3 was unreachable,
    /// so the query was never actually proven unknown.
    Miss { definitive: bool },
}

/// Tunables for the tier walk.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// TTL for positive Tier 1 entries.
    pub tier1_ttl: Duration,
    /// TTL for positive Tier 2 entries.
    pub tier2_ttl: Duration,
    /// TTL for negative markers in both tiers.
    pub negative_ttl: Duration,
    /// Budget for a Tier 2 round trip before falling through.
    pub tier2_timeout: Duration,
    /// Minimum cosine similarity for a Tier 3 match.
    pub min_similarity: f32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tier1_ttl: Duration::from_secs(defaults::TIER1_TTL_SECS),
            tier2_ttl: Duration::from_secs(defaults::TIER2_TTL_SECS),
            negative_ttl: Duration::from_secs(defaults::NEGATIVE_TTL_SECS),
            tier2_timeout: Duration::from_millis(defaults::TIER2_TIMEOUT_MS),
            min_similarity: defaults::MIN_SIMILARITY,
        }
    }
}

impl ManagerConfig {
    /// Build from environment configuration.
    ///
    /// Reads:
    /// - `CACHE_TIER1_TTL_SECS` (default: 300)
    /// - `CACHE_TIER2_TTL_SECS` (default: 604800, 7 days)
    /// - `CACHE_NEGATIVE_TTL_SECS` (default: 300)
    /// - `CACHE_TIER2_TIMEOUT_MS` (default: 250)
    /// - `SEARCH_MIN_SIMILARITY` (default: 0.85)
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            tier1_ttl: Duration::from_secs(secs("CACHE_TIER1_TTL_SECS", defaults::TIER1_TTL_SECS)),
            tier2_ttl: Duration::from_secs(secs("CACHE_TIER2_TTL_SECS", defaults::TIER2_TTL_SECS)),
            negative_ttl: Duration::from_secs(secs(
                "CACHE_NEGATIVE_TTL_SECS",
                defaults::NEGATIVE_TTL_SECS,
            )),
            tier2_timeout: Duration::from_millis(secs(
                "CACHE_TIER2_TIMEOUT_MS",
                defaults::TIER2_TIMEOUT_MS,
            )),
            min_similarity: std::env::var("SEARCH_MIN_SIMILARITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::MIN_SIMILARITY),
        }
    }

    pub fn with_tier1_ttl(mut self, ttl: Duration) -> Self {
        self.tier1_ttl = ttl;
        self
    }

    pub fn with_tier2_ttl(mut self, ttl: Duration) -> Self {
        self.tier2_ttl = ttl;
        self
    }

    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    pub fn with_tier2_timeout(mut self, timeout: Duration) -> Self {
        self.tier2_timeout = timeout;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Enforce `tier1_ttl <= tier2_ttl`.
    ///
    /// A longer Tier 1 TTL would let a single process serve entries the
    /// shared tier already dropped, so the window is clamped.
    fn normalized(mut self) -> Self {
        if self.tier1_ttl > self.tier2_ttl {
            warn!(
                tier1_ttl_secs = self.tier1_ttl.as_secs(),
                tier2_ttl_secs = self.tier2_ttl.as_secs(),
                "tier1 TTL exceeds tier2 TTL, clamping"
            );
            self.tier1_ttl = self.tier2_ttl;
        }
        self
    }
}

/// Walks the cache hierarchy for lookups and keeps the tiers coherent.
pub struct CacheTierManager {
    tiers: Vec<Arc<dyn CacheStore>>,
    store: Arc<dyn SupplementStore>,
    backend: Arc<dyn EmbeddingBackend>,
    config: ManagerConfig,
}

impl CacheTierManager {
    /// Create a manager with no volatile tiers (every lookup hits the store).
    pub fn new(store: Arc<dyn SupplementStore>, backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self::with_config(store, backend, ManagerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn SupplementStore>,
        backend: Arc<dyn EmbeddingBackend>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            tiers: Vec::new(),
            store,
            backend,
            config: config.normalized(),
        }
    }

    /// Append a volatile tier; tiers are walked in insertion order.
    pub fn with_tier(mut self, tier: Arc<dyn CacheStore>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn positive_ttl(&self, tier: CacheTier) -> Duration {
        match tier {
            CacheTier::Tier2 => self.config.tier2_ttl,
            _ => self.config.tier1_ttl,
        }
    }

    /// Look up a normalized query, consulting tiers in order and falling
    /// back to an authoritative store search.
    #[instrument(skip(self, normalized_query), fields(
        subsystem = "search",
        component = "cache_manager",
        op = "lookup",
        normalized_query = %normalized_query,
    ))]
    pub async fn lookup(&self, normalized_query: &str, limit: i64) -> TierLookup {
        let start = Instant::now();
        let key = cache_key(normalized_query);

        for (idx, tier_store) in self.tiers.iter().enumerate() {
            let tier = tier_store.tier();

            let result = if tier == CacheTier::Tier2 {
                match tokio::time::timeout(self.config.tier2_timeout, tier_store.get(&key)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            cache_tier = %tier,
                            timeout_ms = self.config.tier2_timeout.as_millis() as u64,
                            "cache tier timed out, falling through"
                        );
                        continue;
                    }
                }
            } else {
                tier_store.get(&key).await
            };

            match result {
                Ok(Some(CachedLookup::Hit(scored))) => {
                    debug!(
                        cache_tier = %tier,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "cache hit"
                    );
                    self.backfill(&key, &CachedLookup::Hit(scored.clone()), idx, false)
                        .await;
                    return TierLookup::Hit {
                        best: scored,
                        alternatives: Vec::new(),
                        tier,
                    };
                }
                Ok(Some(CachedLookup::NotFound)) => {
                    debug!(cache_tier = %tier, "negative marker hit");
                    self.backfill(&key, &CachedLookup::NotFound, idx, true).await;
                    return TierLookup::Miss { definitive: true };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(cache_tier = %tier, error = %e, "cache tier unavailable, falling through");
                }
            }
        }

        self.search_store(normalized_query, &key, limit, start).await
    }

    /// Authoritative Tier 3: embed the query and search the store.
    async fn search_store(
        &self,
        normalized_query: &str,
        key: &str,
        limit: i64,
        start: Instant,
    ) -> TierLookup {
        let embedding = match self.backend.embed(normalized_query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding unavailable, reporting non-definitive miss");
                return TierLookup::Miss { definitive: false };
            }
        };

        let mut scored = match self
            .store
            .search(&embedding, limit, self.config.min_similarity)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "store search failed, reporting non-definitive miss");
                return TierLookup::Miss { definitive: false };
            }
        };

        if scored.is_empty() {
            debug!(
                duration_ms = start.elapsed().as_millis() as u64,
                "store has no match, writing negative marker"
            );
            self.backfill(key, &CachedLookup::NotFound, self.tiers.len(), true)
                .await;
            return TierLookup::Miss { definitive: true };
        }

        let best = scored.remove(0);
        debug!(
            cache_tier = %CacheTier::Tier3,
            result_count = scored.len() + 1,
            duration_ms = start.elapsed().as_millis() as u64,
            "store hit"
        );
        self.backfill(key, &CachedLookup::Hit(best.clone()), self.tiers.len(), false)
            .await;

        TierLookup::Hit {
            best,
            alternatives: scored,
            tier: CacheTier::Tier3,
        }
    }

    /// Write `value` to every tier above the one that served it.
    ///
    /// Best-effort: a failed write leaves the tier cold, which the next
    /// lookup repairs.
    async fn backfill(&self, key: &str, value: &CachedLookup, upto: usize, negative: bool) {
        for tier_store in &self.tiers[..upto] {
            let tier = tier_store.tier();
            let ttl = if negative {
                self.config.negative_ttl
            } else {
                self.positive_ttl(tier)
            };
            if let Err(e) = tier_store.set(key, value, ttl).await {
                warn!(cache_tier = %tier, error = %e, "cache backfill failed");
            }
        }
    }

    /// Drop the key for a normalized query from every volatile tier.
    ///
    /// The discovery worker calls this after inserting a new entity so a
    /// lingering negative marker dies before its TTL.
    #[instrument(skip(self, normalized_query), fields(
        subsystem = "search",
        component = "cache_manager",
        op = "invalidate",
        normalized_query = %normalized_query,
    ))]
    pub async fn invalidate(&self, normalized_query: &str) {
        let key = cache_key(normalized_query);
        for tier_store in &self.tiers {
            if let Err(e) = tier_store.delete(&key).await {
                warn!(cache_tier = %tier_store.tier(), error = %e, "cache invalidation failed");
            }
        }
    }
}
