//! # nutra-db
//!
//! PostgreSQL database layer for nutra-search.
//!
//! This crate provides:
//! - Connection pool management
//! - Supplement entity store with pgvector cosine search
//! - Discovery queue with leased claims and occurrence-driven priority
//!
//! ## Example
//!
//! ```rust,ignore
//! use nutra_db::Database;
//! use nutra_core::SupplementStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/nutra").await?;
//!
//!     let entity = db.supplements.get_by_canonical("ashwagandha").await?;
//!     println!("{:?}", entity);
//!     Ok(())
//! }
//! ```

pub mod discovery;
pub mod pool;
pub mod supplements;

// Re-export core types
pub use nutra_core::*;

pub use discovery::PgDiscoveryQueue;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use supplements::PgSupplementStore;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Supplement entity store (Tier 3 of the lookup path).
    pub supplements: PgSupplementStore,
    /// Discovery queue for unknown queries.
    pub discovery: PgDiscoveryQueue,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self::with_embedding_model(pool, nutra_core::defaults::EMBED_MODEL)
    }

    /// Create a new Database instance scoped to a specific embedding model.
    pub fn with_embedding_model(
        pool: sqlx::Pool<sqlx::Postgres>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            supplements: PgSupplementStore::with_model(pool.clone(), embedding_model),
            discovery: PgDiscoveryQueue::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Check database reachability.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
