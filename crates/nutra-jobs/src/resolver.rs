//! Resolution of claimed discovery items against the literature.
//!
//! [`DiscoveryResolver`] is the production [`QueueProcessor`]: it asks
//! the literature authority whether any spelling variant of the queued
//! term has published evidence, and on success embeds the term and
//! inserts it as a searchable entity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use nutra_core::{
    DiscoveryItem, EmbeddingBackend, EntityMetadata, Error, EvidenceGrade, LiteratureAuthority,
    NewSupplement, SupplementStore,
};
use nutra_evidence::term_variants;
use nutra_search::CacheTierManager;

use crate::processor::{QueueProcessor, Resolution};

/// Category assigned to auto-discovered entities until curation.
const DISCOVERED_CATEGORY: &str = "other";

/// Popularity assigned to auto-discovered entities until curation.
const DISCOVERED_POPULARITY: &str = "low";

/// Provenance marker written into entity metadata.
const DISCOVERED_VIA: &str = "auto-discovery";

/// Validates queued terms against published literature and promotes
/// them to searchable entities.
///
/// One resolution per claim: claims are exclusive and inserts are
/// idempotent, so running several workers against the same queue needs
/// no extra coordination.
pub struct DiscoveryResolver {
    store: Arc<dyn SupplementStore>,
    backend: Arc<dyn EmbeddingBackend>,
    authority: Arc<dyn LiteratureAuthority>,
    cache: Arc<CacheTierManager>,
}

impl DiscoveryResolver {
    pub fn new(
        store: Arc<dyn SupplementStore>,
        backend: Arc<dyn EmbeddingBackend>,
        authority: Arc<dyn LiteratureAuthority>,
        cache: Arc<CacheTierManager>,
    ) -> Self {
        Self {
            store,
            backend,
            authority,
            cache,
        }
    }

    /// Consult the authority for each variant of the term.
    ///
    /// Returns the first variant with evidence, or `Rejected`/`Retry`
    /// depending on whether the silence was real or a transport fault.
    async fn find_evidence(&self, item: &DiscoveryItem) -> std::result::Result<(String, i64), Resolution> {
        let variants = term_variants(&item.normalized_query);
        let mut transport_error: Option<Error> = None;

        for variant in &variants {
            match self.authority.evidence_count(variant).await {
                Ok(count) if count > 0 => {
                    info!(
                        item_id = %item.id,
                        variant = %variant,
                        study_count = count,
                        "evidence found"
                    );
                    return Ok((variant.clone(), count));
                }
                Ok(_) => {
                    debug!(item_id = %item.id, variant = %variant, "no evidence for variant");
                }
                Err(e) => {
                    warn!(item_id = %item.id, variant = %variant, error = %e, "authority lookup failed");
                    transport_error = Some(e);
                }
            }
        }

        // A variant the authority never answered for might still have
        // evidence, so a transport fault blocks rejection.
        if let Some(e) = transport_error {
            return Err(Resolution::Retry {
                error: format!("literature authority unavailable: {e}"),
            });
        }

        Err(Resolution::Rejected {
            reason: format!("no published evidence across {} term variants", variants.len()),
        })
    }

    /// Embed the validated term and insert it as an entity.
    ///
    /// An entity that already exists under the same canonical key is a
    /// success; the surviving row's id is returned.
    async fn promote(&self, item: &DiscoveryItem, study_count: i64) -> Resolution {
        let embedding = match self.backend.embed(&item.normalized_query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "embedding failed");
                return Resolution::Retry {
                    error: format!("embedding failed: {e}"),
                };
            }
        };

        let entity = NewSupplement {
            canonical_name: item.raw_query.trim().to_string(),
            scientific_name: None,
            aliases: Vec::new(),
            embedding,
            embedding_model: self.backend.model_name().to_string(),
            metadata: EntityMetadata {
                category: Some(DISCOVERED_CATEGORY.to_string()),
                popularity: Some(DISCOVERED_POPULARITY.to_string()),
                evidence_grade: Some(EvidenceGrade::from_study_count(study_count)),
                study_count: Some(study_count),
                source_query: Some(item.normalized_query.clone()),
                discovered_via: Some(DISCOVERED_VIA.to_string()),
                ..Default::default()
            },
            initial_search_count: item.occurrence_count,
        };

        let entity_id = match self.store.insert(entity).await {
            Ok(id) => {
                info!(item_id = %item.id, entity_id = %id, study_count, "entity inserted");
                id
            }
            Err(Error::DuplicateEntity { id }) => {
                debug!(item_id = %item.id, entity_id = %id, "entity already present");
                id
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "entity insert failed");
                return Resolution::Retry {
                    error: format!("entity insert failed: {e}"),
                };
            }
        };

        // Kill any cached negative marker so the next lookup sees the
        // new entity instead of waiting out the marker TTL.
        self.cache.invalidate(&item.normalized_query).await;

        Resolution::Validated { entity_id }
    }
}

#[async_trait]
impl QueueProcessor for DiscoveryResolver {
    #[instrument(
        skip(self, item),
        fields(
            subsystem = "jobs",
            component = "resolver",
            op = "process",
            item_id = %item.id,
            normalized_query = %item.normalized_query,
        )
    )]
    async fn process(&self, item: &DiscoveryItem) -> Resolution {
        match self.find_evidence(item).await {
            Ok((_variant, study_count)) => self.promote(item, study_count).await,
            Err(resolution) => resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use nutra_core::{
        CacheStore, CachedLookup, DiscoveryStatus, Result, ScoredSupplement, SupplementEntity,
        Vector,
    };
    use nutra_inference::mock::MockBackend;
    use nutra_search::{cache_key, LocalCache};

    struct FakeAuthority {
        counts: HashMap<String, i64>,
        failing_terms: Vec<String>,
    }

    impl FakeAuthority {
        fn with_counts(counts: &[(&str, i64)]) -> Self {
            Self {
                counts: counts
                    .iter()
                    .map(|(term, count)| (term.to_string(), *count))
                    .collect(),
                failing_terms: Vec::new(),
            }
        }

        fn failing_on(mut self, term: &str) -> Self {
            self.failing_terms.push(term.to_string());
            self
        }
    }

    #[async_trait]
    impl LiteratureAuthority for FakeAuthority {
        async fn evidence_count(&self, term: &str) -> Result<i64> {
            if self.failing_terms.iter().any(|t| t == term) {
                return Err(Error::Request("connection reset".to_string()));
            }
            Ok(self.counts.get(term).copied().unwrap_or(0))
        }
    }

    #[derive(Default)]
    struct FakeStore {
        inserted: Mutex<Vec<NewSupplement>>,
        duplicate_of: Mutex<Option<Uuid>>,
        fail_insert: bool,
    }

    impl FakeStore {
        fn duplicating(id: Uuid) -> Self {
            Self {
                duplicate_of: Mutex::new(Some(id)),
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail_insert: true,
                ..Default::default()
            }
        }

        fn inserted(&self) -> Vec<NewSupplement> {
            self.inserted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SupplementStore for FakeStore {
        async fn insert(&self, entity: NewSupplement) -> Result<Uuid> {
            if self.fail_insert {
                return Err(Error::Internal("insert connection lost".to_string()));
            }
            if let Some(id) = *self.duplicate_of.lock().unwrap() {
                return Err(Error::DuplicateEntity { id });
            }
            self.inserted.lock().unwrap().push(entity);
            Ok(Uuid::new_v4())
        }

        async fn search(
            &self,
            _embedding: &Vector,
            _limit: i64,
            _min_similarity: f32,
        ) -> Result<Vec<ScoredSupplement>> {
            Ok(Vec::new())
        }

        async fn get(&self, id: Uuid) -> Result<SupplementEntity> {
            Err(Error::SupplementNotFound(id))
        }

        async fn get_by_canonical(&self, _key: &str) -> Result<Option<SupplementEntity>> {
            Ok(None)
        }

        async fn record_search(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn soft_delete(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    fn item(raw: &str, normalized: &str, occurrences: i64, attempts: i32) -> DiscoveryItem {
        DiscoveryItem {
            id: Uuid::new_v4(),
            raw_query: raw.to_string(),
            normalized_query: normalized.to_string(),
            occurrence_count: occurrences,
            priority: occurrences.clamp(0, i32::MAX as i64) as i32,
            status: DiscoveryStatus::Processing,
            attempt_count: attempts,
            last_error: None,
            enqueued_at: Utc::now(),
            last_attempt_at: Some(Utc::now()),
            next_attempt_at: None,
            claimed_at: Some(Utc::now()),
            claim_token: Some(Uuid::new_v4()),
            resolved_occurrence: None,
            entity_id: None,
            updated_at: Utc::now(),
        }
    }

    fn resolver_parts(
        authority: FakeAuthority,
        store: FakeStore,
    ) -> (DiscoveryResolver, Arc<FakeStore>, Arc<LocalCache>) {
        let store = Arc::new(store);
        let tier1 = Arc::new(LocalCache::new());
        let backend = Arc::new(MockBackend::new());
        let manager = Arc::new(
            CacheTierManager::new(
                store.clone() as Arc<dyn SupplementStore>,
                backend.clone() as Arc<dyn EmbeddingBackend>,
            )
            .with_tier(tier1.clone() as Arc<dyn CacheStore>),
        );
        let resolver = DiscoveryResolver::new(
            store.clone() as Arc<dyn SupplementStore>,
            backend as Arc<dyn EmbeddingBackend>,
            Arc::new(authority),
            manager,
        );
        (resolver, store, tier1)
    }

    #[tokio::test]
    async fn evidence_validates_and_inserts_entity() {
        let authority = FakeAuthority::with_counts(&[("ashwagandha", 120)]);
        let (resolver, store, _) = resolver_parts(authority, FakeStore::default());

        let resolution = resolver.process(&item("Ashwagandha", "ashwagandha", 7, 0)).await;

        assert!(matches!(resolution, Resolution::Validated { .. }));
        let inserted = store.inserted();
        assert_eq!(inserted.len(), 1);
        let entity = &inserted[0];
        assert_eq!(entity.canonical_name, "Ashwagandha");
        assert_eq!(entity.embedding_model, "mock-embed");
        assert_eq!(entity.initial_search_count, 7);
        assert_eq!(entity.metadata.category.as_deref(), Some("other"));
        assert_eq!(entity.metadata.popularity.as_deref(), Some("low"));
        assert_eq!(entity.metadata.evidence_grade, Some(EvidenceGrade::A));
        assert_eq!(entity.metadata.study_count, Some(120));
        assert_eq!(entity.metadata.source_query.as_deref(), Some("ashwagandha"));
        assert_eq!(entity.metadata.discovered_via.as_deref(), Some("auto-discovery"));
        assert!(entity.aliases.is_empty());
    }

    #[tokio::test]
    async fn display_name_keeps_raw_casing_trimmed() {
        let authority = FakeAuthority::with_counts(&[("lion's mane", 60)]);
        let (resolver, store, _) = resolver_parts(authority, FakeStore::default());

        resolver.process(&item("  Lion's Mane ", "lion's mane", 1, 0)).await;

        assert_eq!(store.inserted()[0].canonical_name, "Lion's Mane");
    }

    #[tokio::test]
    async fn plural_variant_counts_as_evidence() {
        // The singular has no studies; the generated plural does.
        let authority = FakeAuthority::with_counts(&[("adaptogens", 30)]);
        let (resolver, store, _) = resolver_parts(authority, FakeStore::default());

        let resolution = resolver.process(&item("adaptogen", "adaptogen", 2, 0)).await;

        assert!(matches!(resolution, Resolution::Validated { .. }));
        let entity = &store.inserted()[0];
        assert_eq!(entity.metadata.evidence_grade, Some(EvidenceGrade::C));
        assert_eq!(entity.metadata.study_count, Some(30));
        // The entity is named after the queried term, not the variant
        // that happened to match.
        assert_eq!(entity.canonical_name, "adaptogen");
    }

    #[tokio::test]
    async fn zero_evidence_rejects() {
        let authority = FakeAuthority::with_counts(&[]);
        let (resolver, store, _) = resolver_parts(authority, FakeStore::default());

        let resolution = resolver.process(&item("unobtanium", "unobtanium", 1, 0)).await;

        match resolution {
            Resolution::Rejected { reason } => {
                assert!(reason.contains("no published evidence"), "reason: {reason}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(store.inserted().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_without_evidence_retries() {
        let authority = FakeAuthority::with_counts(&[]).failing_on("valerian");
        let (resolver, store, _) = resolver_parts(authority, FakeStore::default());

        let resolution = resolver.process(&item("valerian", "valerian", 1, 0)).await;

        match resolution {
            Resolution::Retry { error } => {
                assert!(error.contains("literature authority unavailable"), "error: {error}");
            }
            other => panic!("expected retry, got {other:?}"),
        }
        assert!(store.inserted().is_empty());
    }

    #[tokio::test]
    async fn later_variant_outranks_earlier_transport_failure() {
        // The exact term fails at the transport level but its plural
        // answers with evidence; validation wins over the fault.
        let authority =
            FakeAuthority::with_counts(&[("chaga mushrooms", 42)]).failing_on("chaga mushroom");
        let (resolver, _, _) = resolver_parts(authority, FakeStore::default());

        let resolution = resolver
            .process(&item("chaga mushroom", "chaga mushroom", 1, 0))
            .await;

        assert!(matches!(resolution, Resolution::Validated { .. }));
    }

    #[tokio::test]
    async fn duplicate_insert_is_still_validated() {
        let existing = Uuid::new_v4();
        let authority = FakeAuthority::with_counts(&[("magnesium", 400)]);
        let (resolver, _, _) = resolver_parts(authority, FakeStore::duplicating(existing));

        let resolution = resolver.process(&item("magnesium", "magnesium", 3, 0)).await;

        assert_eq!(resolution, Resolution::Validated { entity_id: existing });
    }

    #[tokio::test]
    async fn insert_failure_retries() {
        let authority = FakeAuthority::with_counts(&[("zinc", 80)]);
        let (resolver, _, _) = resolver_parts(authority, FakeStore::failing());

        let resolution = resolver.process(&item("zinc", "zinc", 1, 0)).await;

        assert!(matches!(resolution, Resolution::Retry { .. }));
    }

    #[tokio::test]
    async fn embedding_failure_retries() {
        let authority = FakeAuthority::with_counts(&[("kava", 25)]);
        let store = Arc::new(FakeStore::default());
        let failing_backend = Arc::new(MockBackend::new().with_failure_rate(1.0));
        let manager = Arc::new(CacheTierManager::new(
            store.clone() as Arc<dyn SupplementStore>,
            failing_backend.clone() as Arc<dyn EmbeddingBackend>,
        ));
        let resolver = DiscoveryResolver::new(
            store.clone() as Arc<dyn SupplementStore>,
            failing_backend as Arc<dyn EmbeddingBackend>,
            Arc::new(authority),
            manager,
        );

        let resolution = resolver.process(&item("kava", "kava", 1, 0)).await;

        assert!(matches!(resolution, Resolution::Retry { .. }));
        assert!(store.inserted().is_empty());
    }

    #[tokio::test]
    async fn validation_clears_cached_negative_marker() {
        let authority = FakeAuthority::with_counts(&[("shilajit", 15)]);
        let (resolver, _, tier1) = resolver_parts(authority, FakeStore::default());

        // A prior miss left a negative marker for this query.
        let key = cache_key("shilajit");
        tier1
            .set(&key, &CachedLookup::NotFound, std::time::Duration::from_secs(300))
            .await
            .unwrap();

        resolver.process(&item("shilajit", "shilajit", 1, 0)).await;

        assert!(tier1.get(&key).await.unwrap().is_none());
    }
}
