//! Discovery queue repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use uuid::Uuid;

use nutra_core::{
    defaults, new_v7, DiscoveryItem, DiscoveryQueue, DiscoveryStatus, EnqueueReceipt, Error,
    PriorityLevel, QueueStats, Result,
};

/// PostgreSQL implementation of DiscoveryQueue.
///
/// Enqueue is a single upsert: first sighting inserts a pending row, every
/// later sighting increments the occurrence count. Terminal rows flip back to
/// pending with a fresh attempt budget once the count climbs
/// `REQUEUE_OCCURRENCE_DELTA` past the count they were resolved at.
#[derive(Clone)]
pub struct PgDiscoveryQueue {
    pool: Pool<Postgres>,
    /// Notify handle for event-driven worker wake.
    notify: Arc<Notify>,
}

impl PgDiscoveryQueue {
    /// Create a new PgDiscoveryQueue with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a new PgDiscoveryQueue sharing an existing notify handle.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    /// Get the notification handle for event-driven worker waking.
    pub fn discovery_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Parse a queue row into a DiscoveryItem.
    fn parse_item_row(row: &sqlx::postgres::PgRow) -> DiscoveryItem {
        DiscoveryItem {
            id: row.get("id"),
            raw_query: row.get("raw_query"),
            normalized_query: row.get("normalized_query"),
            occurrence_count: row.get("occurrence_count"),
            priority: row.get("priority"),
            status: row
                .get::<String, _>("status")
                .parse()
                .unwrap_or(DiscoveryStatus::Pending),
            attempt_count: row.get("attempt_count"),
            last_error: row.get("last_error"),
            enqueued_at: row.get("enqueued_at"),
            last_attempt_at: row.get("last_attempt_at"),
            next_attempt_at: row.get("next_attempt_at"),
            claimed_at: row.get("claimed_at"),
            claim_token: row.get("claim_token"),
            resolved_occurrence: row.get("resolved_occurrence"),
            entity_id: row.get("entity_id"),
            updated_at: row.get("updated_at"),
        }
    }
}

const ITEM_COLUMNS: &str = "id, raw_query, normalized_query, occurrence_count, priority, status, \
     attempt_count, last_error, enqueued_at, last_attempt_at, next_attempt_at, \
     claimed_at, claim_token, resolved_occurrence, entity_id, updated_at";

#[async_trait]
impl DiscoveryQueue for PgDiscoveryQueue {
    async fn enqueue(&self, raw_query: &str, normalized_query: &str) -> Result<EnqueueReceipt> {
        let id = new_v7();
        let now = Utc::now();

        // The requeue flip and the increment must be one statement so two
        // concurrent enqueues of the same query cannot race past each other.
        let row = sqlx::query(
            "INSERT INTO discovery_queue
                 (id, raw_query, normalized_query, occurrence_count, priority, status,
                  attempt_count, enqueued_at, updated_at)
             VALUES ($1, $2, $3, 1, 1, 'pending', 0, $4, $4)
             ON CONFLICT (normalized_query) DO UPDATE SET
                 occurrence_count = discovery_queue.occurrence_count + 1,
                 priority = LEAST(discovery_queue.occurrence_count + 1, 2147483647)::int,
                 status = CASE
                     WHEN discovery_queue.status IN ('rejected', 'failed')
                          AND discovery_queue.occurrence_count + 1 >=
                              COALESCE(discovery_queue.resolved_occurrence, 0) + $5
                     THEN 'pending'
                     ELSE discovery_queue.status
                 END,
                 attempt_count = CASE
                     WHEN discovery_queue.status IN ('rejected', 'failed')
                          AND discovery_queue.occurrence_count + 1 >=
                              COALESCE(discovery_queue.resolved_occurrence, 0) + $5
                     THEN 0
                     ELSE discovery_queue.attempt_count
                 END,
                 next_attempt_at = CASE
                     WHEN discovery_queue.status IN ('rejected', 'failed')
                          AND discovery_queue.occurrence_count + 1 >=
                              COALESCE(discovery_queue.resolved_occurrence, 0) + $5
                     THEN NULL
                     ELSE discovery_queue.next_attempt_at
                 END,
                 enqueued_at = CASE
                     WHEN discovery_queue.status IN ('rejected', 'failed')
                          AND discovery_queue.occurrence_count + 1 >=
                              COALESCE(discovery_queue.resolved_occurrence, 0) + $5
                     THEN $4
                     ELSE discovery_queue.enqueued_at
                 END,
                 updated_at = $4
             RETURNING id, normalized_query, occurrence_count, status, enqueued_at",
        )
        .bind(id)
        .bind(raw_query)
        .bind(normalized_query)
        .bind(now)
        .bind(defaults::REQUEUE_OCCURRENCE_DELTA)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let occurrence_count: i64 = row.get("occurrence_count");
        let status: DiscoveryStatus = row
            .get::<String, _>("status")
            .parse()
            .unwrap_or(DiscoveryStatus::Pending);

        let receipt = EnqueueReceipt {
            id: row.get("id"),
            normalized_query: row.get("normalized_query"),
            occurrence_count,
            priority: PriorityLevel::from_occurrences(occurrence_count),
            status,
            enqueued_at: row.get("enqueued_at"),
        };

        if receipt.status == DiscoveryStatus::Pending {
            self.notify.notify_waiters();
        }
        Ok(receipt)
    }

    async fn claim_next(&self) -> Result<Option<DiscoveryItem>> {
        let now = Utc::now();
        let claim_token = new_v7();

        // FOR UPDATE SKIP LOCKED keeps concurrent workers from fighting over
        // the same row. Backed-off rows are invisible until next_attempt_at.
        let row = sqlx::query(&format!(
            "UPDATE discovery_queue
             SET status = 'processing', claimed_at = $1, claim_token = $2,
                 last_attempt_at = $1, updated_at = $1
             WHERE id = (
                 SELECT id FROM discovery_queue
                 WHERE status = 'pending'
                   AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
                 ORDER BY priority DESC, enqueued_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {ITEM_COLUMNS}",
        ))
        .bind(now)
        .bind(claim_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| Self::parse_item_row(&r)))
    }

    async fn mark_validated(&self, id: Uuid, claim_token: Uuid, entity_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE discovery_queue
             SET status = 'validated', entity_id = $3,
                 resolved_occurrence = occurrence_count,
                 attempt_count = attempt_count + 1, last_error = NULL,
                 claimed_at = NULL, claim_token = NULL, updated_at = $4
             WHERE id = $1 AND claim_token = $2 AND status = 'processing'",
        )
        .bind(id)
        .bind(claim_token)
        .bind(entity_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::QueueClaimExpired { item_id: id });
        }
        Ok(())
    }

    async fn mark_rejected(&self, id: Uuid, claim_token: Uuid, reason: &str) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE discovery_queue
             SET status = 'rejected', last_error = $3,
                 resolved_occurrence = occurrence_count,
                 attempt_count = attempt_count + 1,
                 claimed_at = NULL, claim_token = NULL, updated_at = $4
             WHERE id = $1 AND claim_token = $2 AND status = 'processing'",
        )
        .bind(id)
        .bind(claim_token)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::QueueClaimExpired { item_id: id });
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, claim_token: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE discovery_queue
             SET status = 'failed', last_error = $3,
                 resolved_occurrence = occurrence_count,
                 attempt_count = attempt_count + 1,
                 claimed_at = NULL, claim_token = NULL, updated_at = $4
             WHERE id = $1 AND claim_token = $2 AND status = 'processing'",
        )
        .bind(id)
        .bind(claim_token)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::QueueClaimExpired { item_id: id });
        }
        Ok(())
    }

    async fn release_for_retry(
        &self,
        id: Uuid,
        claim_token: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE discovery_queue
             SET status = 'pending', last_error = $3, next_attempt_at = $4,
                 attempt_count = attempt_count + 1,
                 claimed_at = NULL, claim_token = NULL, updated_at = $5
             WHERE id = $1 AND claim_token = $2 AND status = 'processing'",
        )
        .bind(id)
        .bind(claim_token)
        .bind(error)
        .bind(next_attempt_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::QueueClaimExpired { item_id: id });
        }
        Ok(())
    }

    async fn release_expired(&self, lease: Duration) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::seconds(lease.as_secs() as i64);

        // The attempt budget is left alone: an expired lease means the worker
        // died mid-attempt, not that the item failed.
        let result = sqlx::query(
            "UPDATE discovery_queue
             SET status = 'pending', claimed_at = NULL, claim_token = NULL, updated_at = $1
             WHERE status = 'processing' AND claimed_at < $2",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            self.notify.notify_waiters();
        }
        Ok(reclaimed)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'processing') as processing,
                COUNT(*) FILTER (WHERE status = 'validated') as validated,
                COUNT(*) FILTER (WHERE status = 'rejected') as rejected,
                COUNT(*) FILTER (WHERE status = 'failed') as failed,
                COUNT(*) as total
             FROM discovery_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            processing: row.get::<i64, _>("processing"),
            validated: row.get::<i64, _>("validated"),
            rejected: row.get::<i64, _>("rejected"),
            failed: row.get::<i64, _>("failed"),
            total: row.get::<i64, _>("total"),
        })
    }

    async fn list(
        &self,
        status: Option<DiscoveryStatus>,
        limit: i64,
    ) -> Result<Vec<DiscoveryItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM discovery_queue
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY updated_at DESC
             LIMIT $2",
        ))
        .bind(status.map(|s| s.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_item_row).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DiscoveryItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM discovery_queue WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| Self::parse_item_row(&r)))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM discovery_queue WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(count.0)
    }
}
