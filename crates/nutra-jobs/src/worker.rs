//! Background worker that drains the discovery queue.
//!
//! The worker claims pending items, runs them through a
//! [`QueueProcessor`], and records each resolution back on the queue.
//! Claims are exclusive and fenced by claim tokens, so any number of
//! worker processes can share one queue.
//!
//! A worker wakes in three ways: an in-process enqueue signals the
//! shared [`Notify`], the poll interval elapses, or shutdown is
//! requested. The poll interval is the safety net that picks up items
//! enqueued by other processes and retries whose backoff has lapsed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chrono::{DateTime, Utc};
use nutra_core::{defaults, DiscoveryItem, DiscoveryQueue, Error, Result};

use crate::backoff::BackoffPolicy;
use crate::processor::{QueueProcessor, Resolution};

/// Worker runtime configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Whether the worker runs at all.
    pub enabled: bool,
    /// Maximum items resolved concurrently by this process.
    pub max_concurrent: usize,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Age after which another worker's claim is considered abandoned.
    pub lease_secs: u64,
    /// Hard ceiling on a single item's resolution time.
    pub item_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: defaults::DISCOVERY_MAX_CONCURRENT,
            poll_interval_ms: defaults::DISCOVERY_POLL_INTERVAL_MS,
            lease_secs: defaults::DISCOVERY_LEASE_SECS,
            item_timeout_secs: defaults::DISCOVERY_ITEM_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    /// Build a config from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISCOVERY_WORKER_ENABLED` | `true` | Set to `false` or `0` to disable |
    /// | `DISCOVERY_MAX_CONCURRENT` | `2` | Concurrent resolutions per process |
    /// | `DISCOVERY_POLL_INTERVAL_MS` | `15000` | Idle poll interval |
    /// | `DISCOVERY_LEASE_SECS` | `300` | Claim age before lease reclaim |
    /// | `DISCOVERY_ITEM_TIMEOUT_SECS` | `120` | Per-item resolution timeout |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let number = |name: &str, fallback: u64| -> u64 {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(fallback)
        };

        Self {
            enabled: std::env::var("DISCOVERY_WORKER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enabled),
            max_concurrent: std::env::var("DISCOVERY_MAX_CONCURRENT")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .map(|v| v.max(1))
                .unwrap_or(defaults.max_concurrent),
            poll_interval_ms: number("DISCOVERY_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            lease_secs: number("DISCOVERY_LEASE_SECS", defaults.lease_secs),
            item_timeout_secs: number("DISCOVERY_ITEM_TIMEOUT_SECS", defaults.item_timeout_secs),
        }
    }

    /// Enable or disable the worker.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the concurrent resolution limit (minimum 1).
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Set the idle poll interval in milliseconds.
    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set the lease age in seconds.
    pub fn with_lease_secs(mut self, lease_secs: u64) -> Self {
        self.lease_secs = lease_secs;
        self
    }

    /// Set the per-item timeout in seconds.
    pub fn with_item_timeout_secs(mut self, item_timeout_secs: u64) -> Self {
        self.item_timeout_secs = item_timeout_secs;
        self
    }
}

/// Events emitted by the worker for observability and tests.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    WorkerStarted,
    WorkerStopped,
    ItemClaimed {
        item_id: Uuid,
        normalized_query: String,
        attempt: i32,
    },
    ItemValidated {
        item_id: Uuid,
        entity_id: Uuid,
    },
    ItemRejected {
        item_id: Uuid,
        reason: String,
    },
    ItemRetried {
        item_id: Uuid,
        error: String,
        next_attempt_at: DateTime<Utc>,
    },
    ItemFailed {
        item_id: Uuid,
        error: String,
    },
    LeasesReclaimed {
        count: u64,
    },
}

/// Handle to a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Request a graceful shutdown.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".to_string()))
    }

    /// Subscribe to worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Background discovery worker.
pub struct DiscoveryWorker {
    queue: Arc<dyn DiscoveryQueue>,
    processor: Arc<dyn QueueProcessor>,
    config: WorkerConfig,
    backoff: BackoffPolicy,
    wake: Arc<Notify>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl DiscoveryWorker {
    /// Create a worker with default config and backoff.
    pub fn new(queue: Arc<dyn DiscoveryQueue>, processor: Arc<dyn QueueProcessor>) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        Self {
            queue,
            processor,
            config: WorkerConfig::default(),
            backoff: BackoffPolicy::default(),
            wake: Arc::new(Notify::new()),
            event_tx,
        }
    }

    /// Replace the runtime configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the retry policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Share the queue's enqueue notifier so new items are picked up
    /// without waiting out the poll interval.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = wake;
        self
    }

    /// Subscribe to worker events before starting.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker in a background task.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(
                subsystem = "jobs",
                component = "worker",
                "Discovery worker disabled; not starting"
            );
            return;
        }

        info!(
            subsystem = "jobs",
            component = "worker",
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent,
            lease_secs = self.config.lease_secs,
            item_timeout_secs = self.config.item_timeout_secs,
            "Discovery worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let lease = Duration::from_secs(self.config.lease_secs);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!(
                    subsystem = "jobs",
                    component = "worker",
                    "Shutdown requested"
                );
                break;
            }

            self.reclaim_expired_leases(lease).await;

            let mut tasks = JoinSet::new();
            let mut claimed = 0usize;
            for _ in 0..self.config.max_concurrent {
                match self.queue.claim_next().await {
                    Ok(Some(item)) => {
                        claimed += 1;
                        let runner = self.runner();
                        tasks.spawn(async move {
                            runner.resolve_item(item).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(
                            subsystem = "jobs",
                            component = "worker",
                            error = %e,
                            "Failed to claim queue item"
                        );
                        break;
                    }
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(
                            subsystem = "jobs",
                            component = "worker",
                            "Shutdown requested"
                        );
                        break;
                    }
                    _ = self.wake.notified() => {
                        debug!(
                            subsystem = "jobs",
                            component = "worker",
                            "Woken by enqueue"
                        );
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(
                    subsystem = "jobs",
                    component = "worker",
                    claimed,
                    "Processing claimed batch"
                );
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(
                            subsystem = "jobs",
                            component = "worker",
                            error = ?e,
                            "Resolution task panicked"
                        );
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!(
            subsystem = "jobs",
            component = "worker",
            "Discovery worker stopped"
        );
    }

    /// Return abandoned claims to pending before claiming new work.
    async fn reclaim_expired_leases(&self, lease: Duration) {
        match self.queue.release_expired(lease).await {
            Ok(0) => {}
            Ok(count) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    count,
                    "Reclaimed expired claims"
                );
                let _ = self.event_tx.send(WorkerEvent::LeasesReclaimed { count });
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    error = %e,
                    "Failed to release expired claims"
                );
            }
        }
    }

    /// Bundle of the shared handles one resolution needs, cheap to move
    /// into a spawned task.
    fn runner(&self) -> ResolutionRunner {
        ResolutionRunner {
            queue: Arc::clone(&self.queue),
            processor: Arc::clone(&self.processor),
            backoff: self.backoff.clone(),
            item_timeout: Duration::from_secs(self.config.item_timeout_secs),
            event_tx: self.event_tx.clone(),
        }
    }
}

struct ResolutionRunner {
    queue: Arc<dyn DiscoveryQueue>,
    processor: Arc<dyn QueueProcessor>,
    backoff: BackoffPolicy,
    item_timeout: Duration,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl ResolutionRunner {
    /// Process one claimed item and record its resolution.
    async fn resolve_item(self, item: DiscoveryItem) {
        let start = Instant::now();
        let item_id = item.id;
        let attempt = item.attempt_count + 1;

        let Some(claim_token) = item.claim_token else {
            error!(
                subsystem = "jobs",
                component = "worker",
                %item_id,
                "Claimed item carries no claim token"
            );
            return;
        };

        info!(
            subsystem = "jobs",
            component = "worker",
            %item_id,
            normalized_query = %item.normalized_query,
            attempt,
            occurrence_count = item.occurrence_count,
            "Resolving discovery item"
        );
        let _ = self.event_tx.send(WorkerEvent::ItemClaimed {
            item_id,
            normalized_query: item.normalized_query.clone(),
            attempt,
        });

        let resolution = match timeout(self.item_timeout, self.processor.process(&item)).await {
            Ok(resolution) => resolution,
            Err(_) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    %item_id,
                    timeout_secs = self.item_timeout.as_secs(),
                    "Resolution timed out"
                );
                Resolution::Retry {
                    error: format!(
                        "resolution timed out after {}s",
                        self.item_timeout.as_secs()
                    ),
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let recorded = match resolution {
            Resolution::Validated { entity_id } => {
                let result = self
                    .queue
                    .mark_validated(item_id, claim_token, entity_id)
                    .await;
                if result.is_ok() {
                    info!(
                        subsystem = "jobs",
                        component = "worker",
                        %item_id,
                        %entity_id,
                        duration_ms,
                        "Discovery item validated"
                    );
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::ItemValidated { item_id, entity_id });
                }
                result
            }
            Resolution::Rejected { reason } => {
                let result = self.queue.mark_rejected(item_id, claim_token, &reason).await;
                if result.is_ok() {
                    info!(
                        subsystem = "jobs",
                        component = "worker",
                        %item_id,
                        reason = %reason,
                        duration_ms,
                        "Discovery item rejected"
                    );
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::ItemRejected { item_id, reason });
                }
                result
            }
            Resolution::Retry { error } => {
                if self.backoff.attempts_exhausted(attempt) {
                    let result = self.queue.mark_failed(item_id, claim_token, &error).await;
                    if result.is_ok() {
                        warn!(
                            subsystem = "jobs",
                            component = "worker",
                            %item_id,
                            attempt,
                            error = %error,
                            duration_ms,
                            "Retry budget exhausted; discovery item failed"
                        );
                        let _ = self.event_tx.send(WorkerEvent::ItemFailed { item_id, error });
                    }
                    result
                } else {
                    let next_attempt_at = self.backoff.next_attempt_at(attempt, Utc::now());
                    let result = self
                        .queue
                        .release_for_retry(item_id, claim_token, &error, next_attempt_at)
                        .await;
                    if result.is_ok() {
                        warn!(
                            subsystem = "jobs",
                            component = "worker",
                            %item_id,
                            attempt,
                            error = %error,
                            next_attempt_at = %next_attempt_at,
                            "Discovery item released for retry"
                        );
                        let _ = self.event_tx.send(WorkerEvent::ItemRetried {
                            item_id,
                            error,
                            next_attempt_at,
                        });
                    }
                    result
                }
            }
        };

        match recorded {
            Ok(()) => {}
            // Another worker reclaimed the lease mid-flight; its
            // resolution wins and ours is dropped.
            Err(Error::QueueClaimExpired { .. }) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    %item_id,
                    "Claim expired before resolution was recorded"
                );
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    %item_id,
                    error = %e,
                    "Failed to record resolution"
                );
            }
        }
    }
}
