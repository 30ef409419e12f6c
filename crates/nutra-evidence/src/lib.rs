//! # nutra-evidence
//!
//! Literature evidence lookups for supplement validation.
//!
//! This crate provides:
//! - [`PubMedClient`], a `LiteratureAuthority` backed by NCBI E-utilities
//! - [`term_variants`] for naive singular/plural candidate expansion
//!
//! # Example
//!
//! ```rust,no_run
//! use nutra_evidence::PubMedClient;
//! use nutra_core::LiteratureAuthority;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = PubMedClient::from_env();
//!     let count = client.evidence_count("ashwagandha").await.unwrap();
//!     println!("{} studies", count);
//! }
//! ```

pub mod pubmed;
pub mod terms;

// Re-export core types
pub use nutra_core::*;

pub use pubmed::PubMedClient;
pub use terms::term_variants;
