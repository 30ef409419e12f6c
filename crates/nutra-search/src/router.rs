//! Query router: validation, normalization, and miss-triggered discovery.
//!
//! The router is the single entry point for search traffic. It validates
//! and normalizes the raw query, walks the cache tiers through the
//! manager, and on a definitive miss dispatches a discovery enqueue
//! without ever blocking the response on it.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use nutra_core::{
    defaults, CacheTier, DiscoveryQueue, Error, Result, ScoredSupplement, SupplementStore,
};

use crate::manager::{CacheTierManager, TierLookup};

/// Outcome of a routed search.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    /// An entity matched.
    Found {
        best: ScoredSupplement,
        /// Matches beyond the best one; empty unless Tier 3 answered.
        alternatives: Vec<ScoredSupplement>,
        tier: CacheTier,
    },
    /// No entity matched.
    NotFound {
        /// Whether a discovery enqueue was dispatched for this query.
        discovery_queued: bool,
    },
}

/// Routes raw queries through the tier walk and into discovery.
pub struct QueryRouter {
    manager: Arc<CacheTierManager>,
    store: Arc<dyn SupplementStore>,
    queue: Arc<dyn DiscoveryQueue>,
}

impl QueryRouter {
    pub fn new(
        manager: Arc<CacheTierManager>,
        store: Arc<dyn SupplementStore>,
        queue: Arc<dyn DiscoveryQueue>,
    ) -> Self {
        Self {
            manager,
            store,
            queue,
        }
    }

    /// Handle one search request.
    ///
    /// `limit` is clamped to `1..=SEARCH_LIMIT_MAX`. Returns
    /// `Error::InvalidInput` when the query normalizes to nothing or
    /// exceeds the length cap; every infrastructure failure below this
    /// point degrades to a non-definitive miss instead of an error.
    #[instrument(skip(self, raw_query), fields(
        subsystem = "search",
        component = "router",
        op = "handle",
        query = %raw_query,
    ))]
    pub async fn handle(&self, raw_query: &str, limit: i64) -> Result<RouteOutcome> {
        let normalized = nutra_core::normalize_query(raw_query);
        if normalized.is_empty() {
            return Err(Error::InvalidInput("query is empty".to_string()));
        }
        if normalized.chars().count() > defaults::QUERY_MAX_CHARS {
            return Err(Error::InvalidInput(format!(
                "query exceeds {} characters",
                defaults::QUERY_MAX_CHARS
            )));
        }
        let limit = limit.clamp(1, defaults::SEARCH_LIMIT_MAX);

        match self.manager.lookup(&normalized, limit).await {
            TierLookup::Hit {
                best,
                alternatives,
                tier,
            } => {
                self.dispatch_record_search(&best);
                Ok(RouteOutcome::Found {
                    best,
                    alternatives,
                    tier,
                })
            }
            TierLookup::Miss { definitive: true } => {
                self.dispatch_enqueue(raw_query, &normalized);
                Ok(RouteOutcome::NotFound {
                    discovery_queued: true,
                })
            }
            TierLookup::Miss { definitive: false } => Ok(RouteOutcome::NotFound {
                discovery_queued: false,
            }),
        }
    }

    /// Bump the popularity counter off the request path.
    fn dispatch_record_search(&self, best: &ScoredSupplement) {
        let store = Arc::clone(&self.store);
        let entity_id = best.entity.id;
        tokio::spawn(async move {
            if let Err(e) = store.record_search(entity_id).await {
                debug!(%entity_id, error = %e, "record_search failed");
            }
        });
    }

    /// Dispatch the discovery enqueue without awaiting it.
    ///
    /// The raw query keeps its original casing for the eventual display
    /// name; the normalized form is the dedup key. Failures are logged
    /// and swallowed so the miss response is never delayed or altered.
    fn dispatch_enqueue(&self, raw_query: &str, normalized: &str) {
        let queue = Arc::clone(&self.queue);
        let raw = raw_query.trim().to_string();
        let normalized = normalized.to_string();
        tokio::spawn(async move {
            match queue.enqueue(&raw, &normalized).await {
                Ok(receipt) => debug!(
                    normalized_query = %receipt.normalized_query,
                    occurrence_count = receipt.occurrence_count,
                    "discovery enqueue dispatched"
                ),
                Err(e) => warn!(normalized_query = %normalized, error = %e, "discovery enqueue failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerConfig;
    use crate::tier1::LocalCache;

    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use nutra_core::{
        DiscoveryItem, DiscoveryStatus, EnqueueReceipt, NewSupplement, PriorityLevel, QueueStats,
        SupplementEntity, Vector,
    };
    use nutra_inference::MockBackend;

    fn scored(name: &str, similarity: f32) -> ScoredSupplement {
        ScoredSupplement {
            entity: SupplementEntity {
                id: Uuid::new_v4(),
                canonical_name: name.to_string(),
                canonical_key: nutra_core::normalize_query(name),
                scientific_name: None,
                aliases: vec![],
                embedding_model: "mock-embed".to_string(),
                metadata: Default::default(),
                search_count: 0,
                last_searched_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            similarity,
        }
    }

    #[derive(Default)]
    struct FakeStore {
        results: Mutex<Vec<ScoredSupplement>>,
        search_calls: AtomicUsize,
        record_search_calls: AtomicUsize,
        last_limit: AtomicI64,
    }

    impl FakeStore {
        fn with_results(results: Vec<ScoredSupplement>) -> Arc<Self> {
            let store = Self::default();
            *store.results.lock().unwrap() = results;
            Arc::new(store)
        }
    }

    #[async_trait]
    impl SupplementStore for FakeStore {
        async fn insert(&self, _supplement: NewSupplement) -> Result<Uuid> {
            unimplemented!("not used by router tests")
        }

        async fn search(
            &self,
            _query_vec: &Vector,
            limit: i64,
            _min_similarity: f32,
        ) -> Result<Vec<ScoredSupplement>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.last_limit.store(limit, Ordering::SeqCst);
            Ok(self.results.lock().unwrap().clone())
        }

        async fn get(&self, id: Uuid) -> Result<SupplementEntity> {
            Err(Error::SupplementNotFound(id))
        }

        async fn get_by_canonical(&self, _canonical_key: &str) -> Result<Option<SupplementEntity>> {
            Ok(None)
        }

        async fn record_search(&self, _id: Uuid) -> Result<()> {
            self.record_search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn soft_delete(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeQueue {
        enqueues: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl FakeQueue {
        fn failing() -> Self {
            Self {
                enqueues: Mutex::new(vec![]),
                fail: true,
            }
        }

        fn enqueued(&self) -> Vec<(String, String)> {
            self.enqueues.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DiscoveryQueue for FakeQueue {
        async fn enqueue(&self, raw_query: &str, normalized_query: &str) -> Result<EnqueueReceipt> {
            if self.fail {
                return Err(Error::Internal("queue down".into()));
            }
            self.enqueues
                .lock()
                .unwrap()
                .push((raw_query.to_string(), normalized_query.to_string()));
            Ok(EnqueueReceipt {
                id: Uuid::new_v4(),
                normalized_query: normalized_query.to_string(),
                occurrence_count: 1,
                priority: PriorityLevel::Low,
                status: DiscoveryStatus::Pending,
                enqueued_at: Utc::now(),
            })
        }

        async fn claim_next(&self) -> Result<Option<DiscoveryItem>> {
            unimplemented!("not used by router tests")
        }

        async fn mark_validated(&self, _id: Uuid, _token: Uuid, _entity_id: Uuid) -> Result<()> {
            unimplemented!("not used by router tests")
        }

        async fn mark_rejected(&self, _id: Uuid, _token: Uuid, _reason: &str) -> Result<()> {
            unimplemented!("not used by router tests")
        }

        async fn mark_failed(&self, _id: Uuid, _token: Uuid, _error: &str) -> Result<()> {
            unimplemented!("not used by router tests")
        }

        async fn release_for_retry(
            &self,
            _id: Uuid,
            _token: Uuid,
            _error: &str,
            _next_attempt_at: DateTime<Utc>,
        ) -> Result<()> {
            unimplemented!("not used by router tests")
        }

        async fn release_expired(&self, _lease: Duration) -> Result<u64> {
            unimplemented!("not used by router tests")
        }

        async fn stats(&self) -> Result<QueueStats> {
            unimplemented!("not used by router tests")
        }

        async fn list(
            &self,
            _status: Option<DiscoveryStatus>,
            _limit: i64,
        ) -> Result<Vec<DiscoveryItem>> {
            unimplemented!("not used by router tests")
        }

        async fn get(&self, _id: Uuid) -> Result<Option<DiscoveryItem>> {
            unimplemented!("not used by router tests")
        }

        async fn pending_count(&self) -> Result<i64> {
            unimplemented!("not used by router tests")
        }
    }

    fn router(store: Arc<FakeStore>, queue: Arc<FakeQueue>) -> QueryRouter {
        router_with_backend(store, queue, MockBackend::new())
    }

    fn router_with_backend(
        store: Arc<FakeStore>,
        queue: Arc<FakeQueue>,
        backend: MockBackend,
    ) -> QueryRouter {
        let manager = CacheTierManager::with_config(
            store.clone(),
            Arc::new(backend),
            ManagerConfig::default(),
        )
        .with_tier(Arc::new(LocalCache::new()));
        QueryRouter::new(Arc::new(manager), store, queue)
    }

    /// Let fire-and-forget spawns run to completion.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let router = router(FakeStore::with_results(vec![]), Arc::new(FakeQueue::default()));

        for raw in ["", "   ", "\t\n"] {
            let err = router.handle(raw, 5).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "raw: {:?}", raw);
        }
    }

    #[tokio::test]
    async fn overlong_query_is_rejected() {
        let router = router(FakeStore::with_results(vec![]), Arc::new(FakeQueue::default()));

        let too_long = "x".repeat(defaults::QUERY_MAX_CHARS + 1);
        let err = router.handle(&too_long, 5).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // Exactly at the cap is accepted
        let at_cap = "x".repeat(defaults::QUERY_MAX_CHARS);
        assert!(router.handle(&at_cap, 5).await.is_ok());
    }

    #[tokio::test]
    async fn hit_records_search_and_skips_discovery() {
        let store = FakeStore::with_results(vec![scored("Ashwagandha", 0.97)]);
        let queue = Arc::new(FakeQueue::default());
        let router = router(store.clone(), queue.clone());

        match router.handle("Ashwagandha", 5).await.unwrap() {
            RouteOutcome::Found { best, tier, .. } => {
                assert_eq!(best.entity.canonical_name, "Ashwagandha");
                assert_eq!(tier, CacheTier::Tier3);
            }
            other => panic!("expected Found, got {:?}", other),
        }

        settle().await;
        assert_eq!(store.record_search_calls.load(Ordering::SeqCst), 1);
        assert!(queue.enqueued().is_empty());
    }

    #[tokio::test]
    async fn cache_hits_also_record_search() {
        let store = FakeStore::with_results(vec![scored("Ashwagandha", 0.97)]);
        let queue = Arc::new(FakeQueue::default());
        let router = router(store.clone(), queue);

        router.handle("ashwagandha", 5).await.unwrap();
        match router.handle("ashwagandha", 5).await.unwrap() {
            RouteOutcome::Found { tier, .. } => assert_eq!(tier, CacheTier::Tier1),
            other => panic!("expected Found, got {:?}", other),
        }

        settle().await;
        assert_eq!(store.record_search_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn definitive_miss_dispatches_discovery() {
        let store = FakeStore::with_results(vec![]);
        let queue = Arc::new(FakeQueue::default());
        let router = router(store, queue.clone());

        match router.handle("  Lion's Mane  ", 5).await.unwrap() {
            RouteOutcome::NotFound { discovery_queued } => assert!(discovery_queued),
            other => panic!("expected NotFound, got {:?}", other),
        }

        settle().await;
        let enqueued = queue.enqueued();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].0, "Lion's Mane", "display name keeps raw casing");
        assert_eq!(enqueued[0].1, nutra_core::normalize_query("Lion's Mane"));
    }

    #[tokio::test]
    async fn negative_marker_miss_still_counts_demand() {
        let store = FakeStore::with_results(vec![]);
        let queue = Arc::new(FakeQueue::default());
        let router = router(store.clone(), queue.clone());

        router.handle("shilajit", 5).await.unwrap();
        let second = router.handle("shilajit", 5).await.unwrap();
        assert!(matches!(
            second,
            RouteOutcome::NotFound {
                discovery_queued: true
            }
        ));

        settle().await;
        assert_eq!(store.search_calls.load(Ordering::SeqCst), 1, "marker absorbs the search");
        assert_eq!(queue.enqueued().len(), 2, "each miss still counts an occurrence");
    }

    #[tokio::test]
    async fn non_definitive_miss_enqueues_nothing() {
        let store = FakeStore::with_results(vec![]);
        let queue = Arc::new(FakeQueue::default());
        let router = router_with_backend(
            store.clone(),
            queue.clone(),
            MockBackend::new().with_failure_rate(1.0),
        );

        match router.handle("ashwagandha", 5).await.unwrap() {
            RouteOutcome::NotFound { discovery_queued } => assert!(!discovery_queued),
            other => panic!("expected NotFound, got {:?}", other),
        }

        settle().await;
        assert!(queue.enqueued().is_empty());
        assert_eq!(store.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enqueue_failure_never_alters_the_response() {
        let store = FakeStore::with_results(vec![]);
        let queue = Arc::new(FakeQueue::failing());
        let router = router(store, queue);

        let outcome = router.handle("ashwagandha", 5).await.unwrap();
        assert!(matches!(
            outcome,
            RouteOutcome::NotFound {
                discovery_queued: true
            }
        ));
        settle().await;
    }

    #[tokio::test]
    async fn limit_is_clamped_to_bounds() {
        let store = FakeStore::with_results(vec![]);
        let router = router(store.clone(), Arc::new(FakeQueue::default()));

        router.handle("query one", 500).await.unwrap();
        assert_eq!(
            store.last_limit.load(Ordering::SeqCst),
            defaults::SEARCH_LIMIT_MAX
        );

        router.handle("query two", 0).await.unwrap();
        assert_eq!(store.last_limit.load(Ordering::SeqCst), 1);
        settle().await;
    }

    #[tokio::test]
    async fn marker_expiry_lets_the_store_answer_again() {
        let store = FakeStore::with_results(vec![]);
        let queue = Arc::new(FakeQueue::default());

        let manager = CacheTierManager::with_config(
            store.clone(),
            Arc::new(MockBackend::new()),
            ManagerConfig::default().with_negative_ttl(Duration::ZERO),
        )
        .with_tier(Arc::new(LocalCache::new()));
        let router = QueryRouter::new(Arc::new(manager), store.clone(), queue);

        router.handle("reishi", 5).await.unwrap();
        *store.results.lock().unwrap() = vec![scored("Reishi", 0.93)];

        match router.handle("reishi", 5).await.unwrap() {
            RouteOutcome::Found { tier, .. } => assert_eq!(tier, CacheTier::Tier3),
            other => panic!("expected Found once the marker expired, got {:?}", other),
        }
        settle().await;
    }
}
