//! Drains `PendingQueue` against a `Backend`, driving `SyncStatus` through
//! its legal transitions and retrying failed pushes with jittered
//! exponential backoff, grounded on the optimistic-write retry/rollback
//! shape already established by `ripple_storage::write::WriteEngine` and
//! generalized here into a standalone loop over the whole queue.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use ripple_core::{
    CacheOrigin, ConflictError, ConflictResolution, Entity, ErrorKind, MetricsReporter,
    NullReporter, OpContext, PendingChange, PendingOp, RetryConfig, RippleError, RippleResult,
    SyncStatus,
};
use tokio::sync::watch;
use tracing::{info, warn};

use ripple_storage::{Backend, CacheObserver, CacheStore, PendingQueue};

/// Drives one entity type's pending-change queue against its backend.
pub struct SyncEngine<T: Entity, B: Backend<T>> {
    backend: Arc<B>,
    cache: Arc<CacheStore<T>>,
    pending: Arc<PendingQueue<T>>,
    retry: RetryConfig,
    conflict_resolution: ConflictResolution,
    status_tx: watch::Sender<SyncStatus>,
    connected_rx: watch::Receiver<bool>,
    metrics: Arc<dyn MetricsReporter>,
    observer: Option<Arc<dyn CacheObserver<T>>>,
}

impl<T: Entity, B: Backend<T>> SyncEngine<T, B> {
    pub fn new(
        backend: Arc<B>,
        cache: Arc<CacheStore<T>>,
        pending: Arc<PendingQueue<T>>,
        retry: RetryConfig,
        conflict_resolution: ConflictResolution,
        connected_rx: watch::Receiver<bool>,
        observer: Option<Arc<dyn CacheObserver<T>>>,
    ) -> Self {
        Self::with_metrics(
            backend,
            cache,
            pending,
            retry,
            conflict_resolution,
            connected_rx,
            Arc::new(NullReporter),
            observer,
        )
    }

    pub fn with_metrics(
        backend: Arc<B>,
        cache: Arc<CacheStore<T>>,
        pending: Arc<PendingQueue<T>>,
        retry: RetryConfig,
        conflict_resolution: ConflictResolution,
        connected_rx: watch::Receiver<bool>,
        metrics: Arc<dyn MetricsReporter>,
        observer: Option<Arc<dyn CacheObserver<T>>>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Synced);
        Self {
            backend,
            cache,
            pending,
            retry,
            conflict_resolution,
            status_tx,
            connected_rx,
            metrics,
            observer,
        }
    }

    fn notify(&self, id: &T::Id, value: Option<&T>) {
        if let Some(observer) = &self.observer {
            observer.on_update(id, value);
        }
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn pending_count(&self) -> u64 {
        self.pending.count()
    }

    /// Explicitly pause the loop (e.g. the caller observed connectivity
    /// drop out-of-band). `resume` continues from wherever the pending
    /// queue's actual state puts it on the next `run_once`.
    pub fn pause(&self) {
        self.transition(SyncStatus::Paused);
    }

    fn transition(&self, to: SyncStatus) {
        let applied = self
            .status_tx
            .send_if_modified(|current| {
                if current.can_transition_to(to) && *current != to {
                    *current = to;
                    true
                } else {
                    false
                }
            });
        if applied {
            info!(?to, "sync status transition");
        }
    }

    /// Process every due pending change once. Intended to be called by a
    /// caller-owned loop on whatever cadence `SyncMode` dictates
    /// (`Realtime`/`Periodic`/`EventDriven`); this type has no opinion on
    /// scheduling, only on what happens each time it's invoked.
    pub async fn run_once(&self) -> RippleResult<()> {
        if !*self.connected_rx.borrow() {
            self.transition(SyncStatus::Paused);
            return Ok(());
        }

        let now = Utc::now();
        let due = self.pending.due(now);
        if due.is_empty() {
            self.transition(if self.pending.is_empty() {
                SyncStatus::Synced
            } else {
                SyncStatus::Pending
            });
            return Ok(());
        }

        self.transition(SyncStatus::Pending);
        self.transition(SyncStatus::Syncing);

        let mut any_conflict = false;
        let mut any_error = false;
        for change in due {
            match self.push(&change).await {
                PushOutcome::Confirmed => {
                    self.metrics.record_counter("sync.confirmed", 1);
                }
                PushOutcome::Retrying => {
                    self.metrics.record_counter("sync.retry_scheduled", 1);
                }
                PushOutcome::Conflict => {
                    any_conflict = true;
                    self.metrics.record_counter("sync.conflict", 1);
                }
                PushOutcome::Failed => {
                    any_error = true;
                    self.metrics.record_counter("sync.failed", 1);
                }
            }
        }

        if any_conflict {
            self.transition(SyncStatus::Conflict);
        } else if any_error {
            self.transition(SyncStatus::Error);
        } else if self.pending.is_empty() {
            self.transition(SyncStatus::Synced);
        } else {
            self.transition(SyncStatus::Pending);
        }
        Ok(())
    }

    async fn push(&self, change: &PendingChange<T, T::Id>) -> PushOutcome {
        let result = match change.op {
            PendingOp::Save => {
                let item = change
                    .snapshot_after
                    .clone()
                    .expect("save change always carries snapshot_after");
                self.backend.save_remote(&item).await.map(Some)
            }
            PendingOp::Delete => self.backend.delete_remote(&change.id).await.map(|_| None),
        };

        match result {
            Ok(confirmed) => {
                self.pending.remove(&change.id);
                match confirmed {
                    Some(value) => {
                        self.cache
                            .put_value(change.id.clone(), value.clone(), CacheOrigin::Remote, None);
                        self.notify(&change.id, Some(&value));
                    }
                    None => {
                        self.cache.put_tombstone(change.id.clone(), CacheOrigin::Remote);
                        self.notify(&change.id, None);
                    }
                }
                PushOutcome::Confirmed
            }
            Err(err) if err.kind() == ErrorKind::Conflict => self.resolve_conflict(change, err).await,
            Err(err) if err.is_retryable() && change.attempts() + 1 < self.retry.max_retries => {
                let next_attempt = Utc::now() + self.jittered_delay(change.attempts() + 1);
                self.pending.reschedule(&change.id, next_attempt);
                warn!(id = ?change.id, attempt = change.attempts() + 1, %err, "sync push retrying");
                PushOutcome::Retrying
            }
            Err(err) => {
                self.pending.remove(&change.id);
                self.rollback(change);
                warn!(id = ?change.id, %err, "sync push failed, rolled back");
                PushOutcome::Failed
            }
        }
    }

    async fn resolve_conflict(&self, change: &PendingChange<T, T::Id>, err: RippleError) -> PushOutcome {
        match self.conflict_resolution {
            ConflictResolution::ServerWins => {
                self.pending.remove(&change.id);
                match self.backend.get_remote(&change.id).await {
                    Ok(Some(value)) => {
                        self.cache
                            .put_value(change.id.clone(), value.clone(), CacheOrigin::Remote, None);
                        self.notify(&change.id, Some(&value));
                    }
                    Ok(None) => {
                        self.cache.put_tombstone(change.id.clone(), CacheOrigin::Remote);
                        self.notify(&change.id, None);
                    }
                    Err(_) => {}
                }
                PushOutcome::Confirmed
            }
            ConflictResolution::ClientWins => {
                // Force the client's value through again on the next cycle
                // rather than accepting the server's state.
                self.pending.reschedule(&change.id, Utc::now());
                PushOutcome::Retrying
            }
            ConflictResolution::LatestWins
            | ConflictResolution::Merge
            | ConflictResolution::Crdt
            | ConflictResolution::Custom => {
                // No entity-specific timestamp/merge/CRDT hook is available
                // to a generic engine; leave the change queued and surface
                // `conflict` so an interceptor or operator can intervene.
                let _ = ConflictError::Unresolved {
                    context: OpContext::new("sync"),
                };
                let _ = err;
                PushOutcome::Conflict
            }
        }
    }

    fn rollback(&self, change: &PendingChange<T, T::Id>) {
        match &change.snapshot_before {
            Some(value) => self.cache.put_value(change.id.clone(), value.clone(), CacheOrigin::Remote, None),
            None => self.cache.forget(&change.id),
        }
        self.notify(&change.id, change.snapshot_before.as_ref());
    }

    fn jittered_delay(&self, attempt: u32) -> chrono::Duration {
        let base = self.retry.base_delay_for_attempt(attempt);
        let jitter = self.retry.jitter_factor;
        let factor = if jitter <= 0.0 {
            1.0
        } else {
            1.0 + rand::rng().random_range(-jitter..=jitter)
        };
        let millis = (base.as_secs_f64() * factor).max(0.0) * 1000.0;
        chrono::Duration::milliseconds(millis as i64)
    }
}

enum PushOutcome {
    Confirmed,
    Retrying,
    Conflict,
    Failed,
}
