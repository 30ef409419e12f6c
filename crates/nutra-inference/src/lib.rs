//! # nutra-inference
//!
//! Embedding backend abstraction for nutra-search.
//!
//! This crate provides:
//! - Ollama implementation of [`nutra_core::EmbeddingBackend`] (default)
//! - Deterministic mock backend for testing (feature `mock`)
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `mock`: Enable mock backend (for tests)
//! - `integration`: Enable integration tests that require a live Ollama server
//!
//! # Example
//!
//! ```rust,no_run
//! use nutra_inference::OllamaBackend;
//! use nutra_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let texts = vec!["ashwagandha".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use nutra_core::*;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockBackend;
