//! Tier 2: Redis-backed shared cache.
//!
//! Survives process restarts and is shared across instances. The tier is
//! optional: when `REDIS_ENABLED=false` or the initial connection fails,
//! every operation becomes a no-op and lookups fall through.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" to disable the tier (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use nutra_core::{CacheStore, CacheTier, CachedLookup, Error, Result};

/// Default Redis connection URL.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Redis cache tier.
#[derive(Clone)]
pub struct RedisCache {
    inner: Arc<RedisCacheInner>,
}

struct RedisCacheInner {
    /// Connection manager (None when the tier is disabled).
    connection: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    /// Create the tier from environment configuration.
    ///
    /// A failed connection attempt downgrades to a disabled tier with a
    /// warning instead of failing startup; the service keeps working on
    /// Tier 1 and the store.
    pub async fn from_env() -> Self {
        let enabled = std::env::var("REDIS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        if !enabled {
            info!("Tier 2 cache disabled via REDIS_ENABLED=false");
            return Self::disabled();
        }

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::connect(&redis_url).await
    }

    /// Connect to the given Redis URL, downgrading to disabled on failure.
    pub async fn connect(redis_url: &str) -> Self {
        let connection = match redis::Client::open(redis_url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => {
                    info!(
                        "Tier 2 cache enabled (URL: {})",
                        redis_url.replace(|c: char| c.is_ascii_alphanumeric(), "*")
                    );
                    Some(conn)
                }
                Err(e) => {
                    warn!("Failed to connect to Redis, tier 2 disabled: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Invalid Redis URL, tier 2 disabled: {}", e);
                None
            }
        };

        Self {
            inner: Arc::new(RedisCacheInner {
                connection: RwLock::new(connection),
            }),
        }
    }

    /// Create a disabled tier (for tests or Redis-less deployments).
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(RedisCacheInner {
                connection: RwLock::new(None),
            }),
        }
    }

    /// Whether the tier holds a live connection handle.
    pub async fn is_connected(&self) -> bool {
        self.inner.connection.read().await.is_some()
    }

    /// Clone the connection handle out of the lock so concurrent
    /// operations do not serialize on it.
    async fn connection(&self) -> Option<ConnectionManager> {
        self.inner.connection.read().await.clone()
    }

    fn unavailable(reason: impl std::fmt::Display) -> Error {
        Error::CacheTierUnavailable {
            tier: "tier2".to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<CachedLookup>> {
        let Some(mut conn) = self.connection().await else {
            return Ok(None);
        };

        let data: Option<String> = conn
            .get(key)
            .await
            .map_err(Self::unavailable)?;

        match data {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    debug!(cache_key = key, "tier2 hit");
                    Ok(Some(value))
                }
                Err(e) => {
                    // Stale payload schema from an older release reads as a miss
                    warn!(cache_key = key, "tier2 payload failed to decode: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &CachedLookup, ttl: Duration) -> Result<()> {
        let Some(mut conn) = self.connection().await else {
            return Ok(());
        };

        let payload = serde_json::to_string(value)?;
        // SET .. EX rejects a zero expiry
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, payload, ttl_secs)
            .await
            .map_err(Self::unavailable)?;
        debug!(cache_key = key, ttl_secs, "tier2 set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let Some(mut conn) = self.connection().await else {
            return Ok(());
        };

        conn.del::<_, ()>(key).await.map_err(Self::unavailable)?;
        debug!(cache_key = key, "tier2 delete");
        Ok(())
    }

    fn tier(&self) -> CacheTier {
        CacheTier::Tier2
    }
}
