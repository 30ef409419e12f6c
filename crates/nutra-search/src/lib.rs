//! # nutra-search
//!
//! Tiered semantic lookup pipeline for the nutra system.
//!
//! This crate provides:
//! - Tier 1: in-process LRU cache with lazy TTL expiry
//! - Tier 2: shared Redis cache keyed by hashed normalized queries
//! - Tier 3: authoritative pgvector similarity search via the store
//! - A cache tier manager that walks the hierarchy, backfills hits,
//!   and writes short-lived negative markers
//! - A query router that validates input and dispatches auto-discovery
//!   on definitive misses
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nutra_search::{CacheTierManager, LocalCache, ManagerConfig, QueryRouter, RedisCache};
//!
//! let manager = CacheTierManager::with_config(store, backend, ManagerConfig::from_env())
//!     .with_tier(Arc::new(LocalCache::new()))
//!     .with_tier(Arc::new(RedisCache::from_env().await));
//! let router = QueryRouter::new(Arc::new(manager), store, queue);
//!
//! match router.handle("lions mane", 5).await? {
//!     RouteOutcome::Found { best, .. } => println!("{}", best.entity.canonical_name),
//!     RouteOutcome::NotFound { discovery_queued } => println!("queued: {discovery_queued}"),
//! }
//! ```

pub mod manager;
pub mod router;
pub mod tier1;
pub mod tier2;

// Re-export core types
pub use nutra_core::*;

// Re-export pipeline types
pub use manager::{cache_key, CacheTierManager, ManagerConfig, TierLookup};
pub use router::{QueryRouter, RouteOutcome};
pub use tier1::LocalCache;
pub use tier2::RedisCache;
