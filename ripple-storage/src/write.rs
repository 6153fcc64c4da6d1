//! The write-policy engine: decides ordering of cache/remote effects for a
//! write and optimistic-rollback behavior.

use std::sync::Arc;
use std::time::Duration;

use ripple_core::{
    CacheOrigin, ConflictError, ConflictResolution, Entity, ErrorKind, PendingChange, RippleError,
    RippleResult, WritePolicy,
};

use crate::backend::Backend;
use crate::cache::CacheStore;
use crate::fetch::CacheObserver;
use crate::queue::PendingQueue;

pub struct WriteEngine<T: Entity, B: Backend<T>> {
    backend: Arc<B>,
    cache: Arc<CacheStore<T>>,
    queue: Arc<PendingQueue<T>>,
    default_staleness: Option<Duration>,
    conflict_resolution: ConflictResolution,
    observer: Option<Arc<dyn CacheObserver<T>>>,
}

impl<T: Entity, B: Backend<T>> WriteEngine<T, B> {
    pub fn new(
        backend: Arc<B>,
        cache: Arc<CacheStore<T>>,
        queue: Arc<PendingQueue<T>>,
        default_staleness: Option<Duration>,
        conflict_resolution: ConflictResolution,
        observer: Option<Arc<dyn CacheObserver<T>>>,
    ) -> Self {
        Self {
            backend,
            cache,
            queue,
            default_staleness,
            conflict_resolution,
            observer,
        }
    }

    fn notify(&self, id: &T::Id, value: Option<&T>) {
        if let Some(observer) = &self.observer {
            observer.on_update(id, value);
        }
    }

    pub async fn save(&self, item: T, policy: WritePolicy) -> RippleResult<T> {
        let id = item.id();
        match policy {
            WritePolicy::CacheOnly => {
                self.cache
                    .put_value(id.clone(), item.clone(), CacheOrigin::Local, self.default_staleness);
                self.notify(&id, Some(&item));
                Ok(item)
            }
            WritePolicy::CacheFirst => {
                let snapshot_before = self.cache.get(&id).and_then(|e| e.value);
                self.cache.put_value(
                    id.clone(),
                    item.clone(),
                    CacheOrigin::Optimistic,
                    self.default_staleness,
                );
                self.notify(&id, Some(&item));
                self.queue
                    .enqueue(PendingChange::save(id, snapshot_before, item.clone()));
                Ok(item)
            }
            WritePolicy::NetworkFirst => {
                let saved = self.backend.save_remote(&item).await?;
                self.cache.put_value(
                    id.clone(),
                    saved.clone(),
                    CacheOrigin::Remote,
                    self.default_staleness,
                );
                self.notify(&id, Some(&saved));
                Ok(saved)
            }
            WritePolicy::CacheAndNetwork => self.save_optimistic(id, item).await,
        }
    }

    async fn save_optimistic(&self, id: T::Id, item: T) -> RippleResult<T> {
        let snapshot_before = self.cache.get(&id).and_then(|e| e.value);
        self.cache.put_value(
            id.clone(),
            item.clone(),
            CacheOrigin::Optimistic,
            self.default_staleness,
        );
        self.notify(&id, Some(&item));
        self.queue
            .enqueue(PendingChange::save(id.clone(), snapshot_before.clone(), item.clone()));

        match self.backend.save_remote(&item).await {
            Ok(confirmed) => {
                self.queue.remove(&id);
                self.cache.put_value(
                    id.clone(),
                    confirmed.clone(),
                    CacheOrigin::Remote,
                    self.default_staleness,
                );
                self.notify(&id, Some(&confirmed));
                Ok(confirmed)
            }
            Err(err) if err.kind() == ErrorKind::Conflict => {
                self.handle_save_conflict(id, item, snapshot_before, err).await
            }
            Err(err) if err.is_retryable() => {
                // Leave the optimistic value and the pending change in
                // place; the sync loop will retry. The caller observes
                // success now and the write settles in the background.
                Ok(item)
            }
            Err(err) => {
                self.queue.remove(&id);
                self.rollback(&id, snapshot_before);
                Err(err)
            }
        }
    }

    async fn handle_save_conflict(
        &self,
        id: T::Id,
        item: T,
        snapshot_before: Option<T>,
        err: RippleError,
    ) -> RippleResult<T> {
        match self.conflict_resolution {
            ConflictResolution::ServerWins => {
                self.queue.remove(&id);
                let server_value = self.backend.get_remote(&id).await?;
                match &server_value {
                    Some(v) => self.cache.put_value(
                        id.clone(),
                        v.clone(),
                        CacheOrigin::Remote,
                        self.default_staleness,
                    ),
                    None => self.cache.put_tombstone(id.clone(), CacheOrigin::Remote),
                }
                self.notify(&id, server_value.as_ref());
                server_value.ok_or(err)
            }
            ConflictResolution::ClientWins => {
                // Keep the optimistic value; re-queue for the sync loop to
                // force through on its next attempt.
                self.queue
                    .enqueue(PendingChange::save(id, snapshot_before, item.clone()));
                Ok(item)
            }
            ConflictResolution::LatestWins
            | ConflictResolution::Merge
            | ConflictResolution::Crdt
            | ConflictResolution::Custom => {
                // These require entity-specific timestamp or merge logic the
                // engine doesn't have generically; surface as unresolved so
                // the caller (or an interceptor) can apply domain policy.
                self.queue.remove(&id);
                Err(RippleError::Conflict(ConflictError::Unresolved {
                    context: ripple_core::OpContext::new("save"),
                }))
            }
        }
    }

    fn rollback(&self, id: &T::Id, snapshot_before: Option<T>) {
        match &snapshot_before {
            Some(value) => self.cache.put_value(
                id.clone(),
                value.clone(),
                CacheOrigin::Remote,
                self.default_staleness,
            ),
            None => self.cache.forget(id),
        }
        self.notify(id, snapshot_before.as_ref());
    }

    pub async fn delete(&self, id: T::Id, policy: WritePolicy) -> RippleResult<bool> {
        match policy {
            WritePolicy::CacheOnly => {
                self.cache.put_tombstone(id.clone(), CacheOrigin::Local);
                self.notify(&id, None);
                Ok(true)
            }
            WritePolicy::CacheFirst => {
                let snapshot_before = self.cache.get(&id).and_then(|e| e.value);
                self.cache.put_tombstone(id.clone(), CacheOrigin::Optimistic);
                self.notify(&id, None);
                self.queue.enqueue(PendingChange::delete(id, snapshot_before));
                Ok(true)
            }
            WritePolicy::NetworkFirst => {
                let deleted = self.backend.delete_remote(&id).await?;
                if deleted {
                    self.cache.put_tombstone(id.clone(), CacheOrigin::Remote);
                    self.notify(&id, None);
                }
                Ok(deleted)
            }
            WritePolicy::CacheAndNetwork => self.delete_optimistic(id).await,
        }
    }

    async fn delete_optimistic(&self, id: T::Id) -> RippleResult<bool> {
        let snapshot_before = self.cache.get(&id).and_then(|e| e.value);
        self.cache.put_tombstone(id.clone(), CacheOrigin::Optimistic);
        self.notify(&id, None);
        self.queue
            .enqueue(PendingChange::delete(id.clone(), snapshot_before.clone()));

        match self.backend.delete_remote(&id).await {
            Ok(deleted) => {
                self.queue.remove(&id);
                self.cache.put_tombstone(id.clone(), CacheOrigin::Remote);
                self.notify(&id, None);
                Ok(deleted)
            }
            Err(err) if err.is_retryable() => Ok(true),
            Err(err) => {
                self.queue.remove(&id);
                self.rollback(&id, snapshot_before);
                Err(err)
            }
        }
    }
}
