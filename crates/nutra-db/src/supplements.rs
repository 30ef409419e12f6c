//! Supplement entity store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use nutra_core::{
    new_v7, normalize_query, EntityMetadata, Error, NewSupplement, Result, ScoredSupplement,
    SupplementEntity, SupplementStore,
};

/// PostgreSQL implementation of SupplementStore.
#[derive(Clone)]
pub struct PgSupplementStore {
    pool: Pool<Postgres>,
    /// Model tag rows are written with and filtered by on search.
    embedding_model: String,
}

impl PgSupplementStore {
    /// Create a new PgSupplementStore with the default embedding model tag.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_model(pool, nutra_core::defaults::EMBED_MODEL)
    }

    /// Create a new PgSupplementStore scoped to a specific embedding model.
    ///
    /// Search only considers rows written with the same model; vectors from
    /// different models are not comparable.
    pub fn with_model(pool: Pool<Postgres>, embedding_model: impl Into<String>) -> Self {
        Self {
            pool,
            embedding_model: embedding_model.into(),
        }
    }

    /// Parse a supplement row into a SupplementEntity.
    ///
    /// The embedding column is never read back. Entities returned to callers
    /// (and serialized into cache tiers) carry only the scalar fields.
    fn parse_entity_row(row: &sqlx::postgres::PgRow) -> Result<SupplementEntity> {
        let metadata: EntityMetadata = serde_json::from_value(row.get("metadata"))?;
        Ok(SupplementEntity {
            id: row.get("id"),
            canonical_name: row.get("canonical_name"),
            canonical_key: row.get("canonical_key"),
            scientific_name: row.get("scientific_name"),
            aliases: row.get("aliases"),
            embedding_model: row.get("embedding_model"),
            metadata,
            search_count: row.get("search_count"),
            last_searched_at: row.get("last_searched_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SupplementStore for PgSupplementStore {
    async fn insert(&self, supplement: NewSupplement) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        let canonical_key = normalize_query(&supplement.canonical_name);
        let metadata = serde_json::to_value(&supplement.metadata)?;
        let last_searched_at = if supplement.initial_search_count > 0 {
            Some(now)
        } else {
            None
        };

        // One live row per canonical key. A conflicting insert is resolved to
        // the surviving row's id so concurrent discovery stays idempotent.
        let inserted: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO supplements
                 (id, canonical_name, canonical_key, scientific_name, aliases, embedding,
                  embedding_model, metadata, search_count, last_searched_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
             ON CONFLICT (canonical_key) WHERE deleted_at IS NULL DO NOTHING
             RETURNING id",
        )
        .bind(id)
        .bind(&supplement.canonical_name)
        .bind(&canonical_key)
        .bind(&supplement.scientific_name)
        .bind(&supplement.aliases)
        .bind(&supplement.embedding)
        .bind(&supplement.embedding_model)
        .bind(&metadata)
        .bind(supplement.initial_search_count)
        .bind(last_searched_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match inserted {
            Some(id) => Ok(id),
            None => {
                let existing: Option<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM supplements WHERE canonical_key = $1 AND deleted_at IS NULL",
                )
                .bind(&canonical_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;

                match existing {
                    Some(id) => Err(Error::DuplicateEntity { id }),
                    // Conflicting row disappeared between the two statements
                    None => Err(Error::Database(sqlx::Error::RowNotFound)),
                }
            }
        }
    }

    async fn search(
        &self,
        embedding: &nutra_core::Vector,
        limit: i64,
        min_similarity: f32,
    ) -> Result<Vec<ScoredSupplement>> {
        let rows = sqlx::query(
            "SELECT id, canonical_name, canonical_key, scientific_name, aliases,
                    embedding_model, metadata, search_count, last_searched_at,
                    created_at, updated_at,
                    1 - (embedding <=> $1::vector) AS similarity
             FROM supplements
             WHERE deleted_at IS NULL
               AND embedding_model = $2
               AND 1 - (embedding <=> $1::vector) >= $3
             ORDER BY similarity DESC, search_count DESC
             LIMIT $4",
        )
        .bind(embedding)
        .bind(&self.embedding_model)
        .bind(min_similarity as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(ScoredSupplement {
                    entity: Self::parse_entity_row(row)?,
                    similarity: row.get::<f64, _>("similarity") as f32,
                })
            })
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<SupplementEntity> {
        let row = sqlx::query(
            "SELECT id, canonical_name, canonical_key, scientific_name, aliases,
                    embedding_model, metadata, search_count, last_searched_at,
                    created_at, updated_at
             FROM supplements
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_entity_row(&row),
            None => Err(Error::SupplementNotFound(id)),
        }
    }

    async fn get_by_canonical(&self, canonical_key: &str) -> Result<Option<SupplementEntity>> {
        let row = sqlx::query(
            "SELECT id, canonical_name, canonical_key, scientific_name, aliases,
                    embedding_model, metadata, search_count, last_searched_at,
                    created_at, updated_at
             FROM supplements
             WHERE canonical_key = $1 AND deleted_at IS NULL",
        )
        .bind(canonical_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_entity_row).transpose()
    }

    async fn record_search(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE supplements
             SET search_count = search_count + 1, last_searched_at = $1, updated_at = $1
             WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE supplements
             SET deleted_at = $1, updated_at = $1
             WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::SupplementNotFound(id));
        }
        Ok(())
    }
}
