//! Queue item processing contract.
//!
//! The worker claims items and hands each one to a [`QueueProcessor`],
//! which condenses whatever it did into a single [`Resolution`]. The
//! processor never touches the queue itself; recording the outcome
//! (and deciding retry vs. failure) is the worker's job, so a processor
//! stays testable without any queue plumbing.

use async_trait::async_trait;
use nutra_core::DiscoveryItem;
use uuid::Uuid;

/// Outcome of processing one claimed discovery item.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Evidence was found and the entity now exists in the store.
    ///
    /// `entity_id` is the surviving row, whether this resolution
    /// inserted it or an earlier one already had.
    Validated { entity_id: Uuid },

    /// No supporting evidence exists. This is a business outcome, not
    /// a fault, and consumes the item without retry.
    Rejected { reason: String },

    /// A dependency failed in a way that may heal. The worker either
    /// reschedules the item with backoff or, once the attempt budget
    /// is spent, marks it failed.
    Retry { error: String },
}

impl Resolution {
    /// Short label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Validated { .. } => "validated",
            Resolution::Rejected { .. } => "rejected",
            Resolution::Retry { .. } => "retry",
        }
    }
}

/// Resolves claimed discovery items.
///
/// Implementations must be infallible at the signature level: every
/// failure mode maps into [`Resolution::Retry`] (transient) or
/// [`Resolution::Rejected`] (terminal), so the worker never has to
/// guess what an `Err` meant.
#[async_trait]
pub trait QueueProcessor: Send + Sync {
    /// Process one claimed item to a resolution.
    async fn process(&self, item: &DiscoveryItem) -> Resolution;
}

/// Processor that resolves everything as rejected. Useful for tests
/// and for draining a queue without side effects.
pub struct RejectAllProcessor;

#[async_trait]
impl QueueProcessor for RejectAllProcessor {
    async fn process(&self, _item: &DiscoveryItem) -> Resolution {
        Resolution::Rejected {
            reason: "processing disabled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nutra_core::DiscoveryStatus;

    fn item() -> DiscoveryItem {
        DiscoveryItem {
            id: Uuid::new_v4(),
            raw_query: "Reishi".to_string(),
            normalized_query: "reishi".to_string(),
            occurrence_count: 1,
            priority: 1,
            status: DiscoveryStatus::Processing,
            attempt_count: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            last_attempt_at: Some(Utc::now()),
            next_attempt_at: None,
            claimed_at: Some(Utc::now()),
            claim_token: Some(Uuid::new_v4()),
            resolved_occurrence: None,
            entity_id: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn resolution_kinds() {
        let validated = Resolution::Validated {
            entity_id: Uuid::new_v4(),
        };
        let rejected = Resolution::Rejected {
            reason: "no evidence".to_string(),
        };
        let retry = Resolution::Retry {
            error: "timeout".to_string(),
        };

        assert_eq!(validated.kind(), "validated");
        assert_eq!(rejected.kind(), "rejected");
        assert_eq!(retry.kind(), "retry");
    }

    #[test]
    fn resolution_is_cloneable_and_comparable() {
        let a = Resolution::Retry {
            error: "pubmed unavailable".to_string(),
        };
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn reject_all_processor_rejects() {
        let resolution = RejectAllProcessor.process(&item()).await;
        assert!(matches!(resolution, Resolution::Rejected { .. }));
    }
}
