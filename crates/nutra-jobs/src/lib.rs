//! # nutra-jobs
//!
//! Background discovery pipeline for nutra-search.
//!
//! This crate turns queued search misses into validated supplement
//! entities. A [`DiscoveryWorker`] claims items from the shared
//! [`DiscoveryQueue`], the [`DiscoveryResolver`] checks each term
//! against the literature authority, and validated terms are embedded
//! and inserted into the supplement store with their caches
//! invalidated.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nutra_jobs::{BackoffPolicy, DiscoveryResolver, DiscoveryWorker, WorkerConfig, WorkerEvent};
//!
//! let resolver = Arc::new(DiscoveryResolver::new(store, backend, authority, cache));
//! let worker = DiscoveryWorker::new(queue, resolver)
//!     .with_config(WorkerConfig::from_env())
//!     .with_backoff(BackoffPolicy::from_env())
//!     .with_wake(db.discovery.discovery_notify());
//!
//! let mut events = worker.events();
//! let handle = worker.start();
//!
//! while let Ok(event) = events.recv().await {
//!     if let WorkerEvent::ItemValidated { entity_id, .. } = event {
//!         println!("new entity {entity_id}");
//!     }
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod backoff;
pub mod processor;
pub mod resolver;
pub mod worker;

// Re-export core types
pub use nutra_core::*;

pub use backoff::BackoffPolicy;
pub use processor::{QueueProcessor, RejectAllProcessor, Resolution};
pub use resolver::DiscoveryResolver;
pub use worker::{DiscoveryWorker, WorkerConfig, WorkerEvent, WorkerHandle};
