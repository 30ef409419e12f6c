//! Integration tests for the supplement store.
//!
//! This test suite validates:
//! - Insert with canonical-key dedup (DuplicateEntity on conflict)
//! - Cosine similarity search with threshold and popularity tiebreak
//! - Search counter updates
//! - Soft delete semantics
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database
//! with the pgvector extension. They are skipped when `DATABASE_URL` is not
//! set.

use nutra_core::{
    normalize_query, EntityMetadata, Error, EvidenceGrade, NewSupplement, SupplementStore, Vector,
};
use nutra_db::Database;
use uuid::Uuid;

/// Helper to create a test database connection, or skip the test.
async fn setup_test_db() -> Option<Database> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database integration test");
        return None;
    };

    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    Some(db)
}

/// Unit vector along one axis, matching the schema's 768 dimensions.
fn unit_vector(axis: usize) -> Vector {
    let mut v = vec![0.0f32; 768];
    v[axis] = 1.0;
    Vector::from(v)
}

fn new_supplement(name: &str, embedding: Vector, initial_search_count: i64) -> NewSupplement {
    NewSupplement {
        canonical_name: name.to_string(),
        scientific_name: Some("Withania somnifera".to_string()),
        aliases: vec!["winter cherry".to_string()],
        embedding,
        embedding_model: nutra_core::defaults::EMBED_MODEL.to_string(),
        metadata: EntityMetadata {
            category: Some("other".to_string()),
            popularity: Some("low".to_string()),
            evidence_grade: Some(EvidenceGrade::B),
            study_count: Some(73),
            discovered_via: Some("auto-discovery".to_string()),
            ..Default::default()
        },
        initial_search_count,
    }
}

async fn cleanup(db: &Database, canonical_key: &str) {
    sqlx::query("DELETE FROM supplements WHERE canonical_key = $1")
        .bind(canonical_key)
        .execute(db.pool())
        .await
        .expect("cleanup failed");
}

#[tokio::test]
async fn test_supplement_store_lifecycle() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    let name = format!("Test Ashwagandha {}", Uuid::new_v4());
    let key = normalize_query(&name);

    // ========================================================================
    // INSERT
    // ========================================================================

    let id = db
        .supplements
        .insert(new_supplement(&name, unit_vector(0), 7))
        .await
        .expect("insert failed");

    // A second insert of the same canonical key resolves to the survivor
    let err = db
        .supplements
        .insert(new_supplement(&name, unit_vector(0), 1))
        .await
        .expect_err("duplicate insert should fail");
    match err {
        Error::DuplicateEntity { id: existing } => assert_eq!(existing, id),
        other => panic!("expected DuplicateEntity, got {:?}", other),
    }

    // ========================================================================
    // READ
    // ========================================================================

    let entity = db.supplements.get(id).await.expect("get failed");
    assert_eq!(entity.canonical_name, name);
    assert_eq!(entity.canonical_key, key);
    assert_eq!(entity.scientific_name.as_deref(), Some("Withania somnifera"));
    assert_eq!(entity.search_count, 7);
    assert_eq!(entity.metadata.evidence_grade, Some(EvidenceGrade::B));
    assert_eq!(entity.metadata.study_count, Some(73));
    assert!(entity.last_searched_at.is_some());

    let by_key = db
        .supplements
        .get_by_canonical(&key)
        .await
        .expect("get_by_canonical failed");
    assert_eq!(by_key.map(|e| e.id), Some(id));

    // ========================================================================
    // SEARCH
    // ========================================================================

    let results = db
        .supplements
        .search(&unit_vector(0), 5, 0.85)
        .await
        .expect("search failed");
    let hit = results
        .iter()
        .find(|s| s.entity.id == id)
        .expect("inserted entity should be a search hit");
    assert!(hit.similarity > 0.99, "similarity was {}", hit.similarity);

    // An orthogonal query vector scores 0.0, below any usable threshold
    let results = db
        .supplements
        .search(&unit_vector(1), 5, 0.85)
        .await
        .expect("search failed");
    assert!(results.iter().all(|s| s.entity.id != id));

    // ========================================================================
    // SEARCH COUNTER
    // ========================================================================

    db.supplements
        .record_search(id)
        .await
        .expect("record_search failed");
    let entity = db.supplements.get(id).await.expect("get failed");
    assert_eq!(entity.search_count, 8);

    // ========================================================================
    // SOFT DELETE
    // ========================================================================

    db.supplements
        .soft_delete(id)
        .await
        .expect("soft_delete failed");

    let err = db.supplements.get(id).await.expect_err("get should fail");
    assert!(matches!(err, Error::SupplementNotFound(_)));

    let results = db
        .supplements
        .search(&unit_vector(0), 5, 0.85)
        .await
        .expect("search failed");
    assert!(results.iter().all(|s| s.entity.id != id));

    // The canonical key is free again once the old row is soft-deleted
    let new_id = db
        .supplements
        .insert(new_supplement(&name, unit_vector(0), 1))
        .await
        .expect("re-insert after soft delete failed");
    assert_ne!(new_id, id);

    cleanup(&db, &key).await;
}

#[tokio::test]
async fn test_search_breaks_similarity_ties_by_popularity() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    let name_popular = format!("Test Creatine Popular {}", Uuid::new_v4());
    let name_niche = format!("Test Creatine Niche {}", Uuid::new_v4());

    // Same embedding, different popularity
    let id_niche = db
        .supplements
        .insert(new_supplement(&name_niche, unit_vector(2), 2))
        .await
        .expect("insert failed");
    let id_popular = db
        .supplements
        .insert(new_supplement(&name_popular, unit_vector(2), 500))
        .await
        .expect("insert failed");

    let results = db
        .supplements
        .search(&unit_vector(2), 10, 0.85)
        .await
        .expect("search failed");

    let pos_popular = results.iter().position(|s| s.entity.id == id_popular);
    let pos_niche = results.iter().position(|s| s.entity.id == id_niche);
    match (pos_popular, pos_niche) {
        (Some(p), Some(n)) => assert!(p < n, "popular entity should rank first on a tie"),
        _ => panic!("both inserted entities should be hits"),
    }

    cleanup(&db, &normalize_query(&name_popular)).await;
    cleanup(&db, &normalize_query(&name_niche)).await;
}

#[tokio::test]
async fn test_record_search_ignores_missing_entity() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    // Fire-and-forget: a concurrently deleted entity must not error
    db.supplements
        .record_search(Uuid::new_v4())
        .await
        .expect("record_search on missing id should be a no-op");
}

#[tokio::test]
async fn test_soft_delete_missing_entity_is_not_found() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    let err = db
        .supplements
        .soft_delete(Uuid::new_v4())
        .await
        .expect_err("soft_delete on missing id should fail");
    assert!(matches!(err, Error::SupplementNotFound(_)));
}
