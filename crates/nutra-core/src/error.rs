//! Error types for nutra.

use thiserror::Error;

/// Result type alias using nutra's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for nutra operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Supplement entity not found
    #[error("Supplement not found: {0}")]
    SupplementNotFound(uuid::Uuid),

    /// Insert rejected because an entity with the same canonical key exists
    #[error("Duplicate entity: {id}")]
    DuplicateEntity { id: uuid::Uuid },

    /// Embedding backend could not produce a usable vector
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A cache tier is unreachable or misbehaving
    #[error("Cache tier {tier} unavailable: {reason}")]
    CacheTierUnavailable { tier: String, reason: String },

    /// Discovery candidate failed evidence validation
    #[error("Validation rejected: {0}")]
    ValidationRejected(String),

    /// Queue item lease was lost before the resolution could be recorded
    #[error("Queue claim expired for item {item_id}")]
    QueueClaimExpired { item_id: uuid::Uuid },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure is worth retrying with backoff.
    ///
    /// Transient failures are infrastructure hiccups (database, network,
    /// embedding backend, cache tiers). Everything else is a decision that
    /// will not change on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Request(_)
                | Error::EmbeddingUnavailable(_)
                | Error::CacheTierUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
