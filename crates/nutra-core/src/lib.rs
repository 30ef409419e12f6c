//! # nutra-core
//!
//! Core types, traits, and abstractions for the nutra search and
//! discovery pipeline.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other nutra crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use normalize::normalize_query;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
