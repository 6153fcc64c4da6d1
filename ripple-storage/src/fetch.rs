//! The fetch-policy engine: decides the ordering of cache vs. remote effects
//! for a read across six `FetchPolicy` variants, using a plain staleness
//! horizon rather than a change-journal watermark.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ripple_core::{CacheOrigin, Entity, ErrorKind, FetchPolicy, Query, RippleError, RippleResult};
use tracing::warn;

use crate::backend::Backend;
use crate::cache::CacheStore;

/// Notified whenever the fetch or write engine mutates the cache, including
/// mutations made by a detached background task (the `cacheAndNetwork`
/// revalidation). The store facade implements this to drive the reactive
/// fan-out without the storage crate depending on it directly.
pub trait CacheObserver<T: Entity>: Send + Sync {
    fn on_update(&self, id: &T::Id, value: Option<&T>);
}

/// Runs reads according to a `FetchPolicy` against a backend and a cache
/// owned by the caller — the cache belongs to the store facade, not to
/// this engine.
pub struct FetchEngine<T: Entity, B: Backend<T>> {
    backend: Arc<B>,
    cache: Arc<CacheStore<T>>,
    default_staleness: Option<Duration>,
    observer: Option<Arc<dyn CacheObserver<T>>>,
}

impl<T: Entity, B: Backend<T> + 'static> FetchEngine<T, B> {
    pub fn new(
        backend: Arc<B>,
        cache: Arc<CacheStore<T>>,
        default_staleness: Option<Duration>,
        observer: Option<Arc<dyn CacheObserver<T>>>,
    ) -> Self {
        Self {
            backend,
            cache,
            default_staleness,
            observer,
        }
    }

    fn notify(&self, id: &T::Id, value: Option<&T>) {
        if let Some(observer) = &self.observer {
            observer.on_update(id, value);
        }
    }

    fn store_and_notify(&self, id: T::Id, value: Option<T>) {
        match &value {
            Some(v) => self
                .cache
                .put_value(id.clone(), v.clone(), CacheOrigin::Remote, self.default_staleness),
            None => self.cache.put_tombstone(id.clone(), CacheOrigin::Remote),
        }
        self.notify(&id, value.as_ref());
    }

    pub async fn get(&self, id: &T::Id, policy: FetchPolicy) -> RippleResult<Option<T>> {
        match policy {
            FetchPolicy::CacheFirst => self.get_cache_first(id).await,
            FetchPolicy::NetworkFirst => self.get_network_first(id).await,
            FetchPolicy::CacheAndNetwork => self.get_cache_and_network(id).await,
            FetchPolicy::CacheOnly => Ok(self.cache.get(id).and_then(|e| e.value)),
            FetchPolicy::NetworkOnly => self.get_network_only(id).await,
            FetchPolicy::StaleWhileRevalidate => {
                if self.cache.get(id).map(|e| e.is_present()).unwrap_or(false) {
                    self.get_cache_and_network(id).await
                } else {
                    self.get_network_first(id).await
                }
            }
        }
    }

    async fn get_cache_first(&self, id: &T::Id) -> RippleResult<Option<T>> {
        if let Some(entry) = self.cache.get(id) {
            if entry.is_present() && !entry.is_stale(Utc::now()) {
                return Ok(entry.value);
            }
        }
        let fetched = self.backend.get_remote(id).await?;
        self.store_and_notify(id.clone(), fetched.clone());
        Ok(fetched)
    }

    async fn get_network_first(&self, id: &T::Id) -> RippleResult<Option<T>> {
        match self.backend.get_remote(id).await {
            Ok(value) => {
                self.store_and_notify(id.clone(), value.clone());
                Ok(value)
            }
            Err(err) if err.kind() == ErrorKind::Network => {
                if let Some(entry) = self.cache.get(id) {
                    if entry.is_present() {
                        return Ok(entry.value);
                    }
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn get_cache_and_network(&self, id: &T::Id) -> RippleResult<Option<T>> {
        let cached = self.cache.get(id).filter(|e| e.is_present());

        let backend = Arc::clone(&self.backend);
        let cache = Arc::clone(&self.cache);
        let observer = self.observer.clone();
        let default_staleness = self.default_staleness;
        let revalidate_id = id.clone();
        tokio::spawn(async move {
            match backend.get_remote(&revalidate_id).await {
                Ok(value) => {
                    match &value {
                        Some(v) => cache.put_value(
                            revalidate_id.clone(),
                            v.clone(),
                            CacheOrigin::Remote,
                            default_staleness,
                        ),
                        None => cache.put_tombstone(revalidate_id.clone(), CacheOrigin::Remote),
                    }
                    if let Some(observer) = observer {
                        observer.on_update(&revalidate_id, value.as_ref());
                    }
                }
                Err(err) => {
                    warn!(error = %err, "background revalidation failed, non-fatal");
                }
            }
        });

        match cached {
            Some(entry) => Ok(entry.value),
            None => {
                // No cache to return synchronously: behave like networkFirst
                // for this call so the caller still gets a value.
                let fetched = self.backend.get_remote(id).await?;
                self.store_and_notify(id.clone(), fetched.clone());
                Ok(fetched)
            }
        }
    }

    async fn get_network_only(&self, id: &T::Id) -> RippleResult<Option<T>> {
        let fetched = self.backend.get_remote(id).await?;
        self.store_and_notify(id.clone(), fetched.clone());
        Ok(fetched)
    }

    /// `get_all` never distinguishes cache-and-network's synchronous-return
    /// vs background-revalidate split the way `get` does: lists are
    /// recomputed wholesale from whichever source the policy selects, and
    /// `cacheAndNetwork`/`staleWhileRevalidate` still revalidate in the
    /// background. Ordering (order-by, then stable by id) is the caller's
    /// responsibility once results are merged into the query-stream cache.
    pub async fn get_all(&self, query: Option<&Query>, policy: FetchPolicy) -> RippleResult<Vec<T>> {
        match policy {
            FetchPolicy::CacheOnly => Ok(self.cache.present_values()),
            FetchPolicy::CacheFirst => {
                if !self.cache.is_empty() {
                    Ok(self.cache.present_values())
                } else {
                    self.backend.get_all_remote(query).await
                }
            }
            FetchPolicy::NetworkFirst | FetchPolicy::NetworkOnly => {
                self.backend.get_all_remote(query).await
            }
            FetchPolicy::CacheAndNetwork | FetchPolicy::StaleWhileRevalidate => {
                let backend = Arc::clone(&self.backend);
                let cache = Arc::clone(&self.cache);
                let observer = self.observer.clone();
                let default_staleness = self.default_staleness;
                let query_owned = query.cloned();
                tokio::spawn(async move {
                    match backend.get_all_remote(query_owned.as_ref()).await {
                        Ok(rows) => {
                            for row in rows {
                                let id = row.id();
                                cache.put_value(id.clone(), row.clone(), CacheOrigin::Remote, default_staleness);
                                if let Some(observer) = &observer {
                                    observer.on_update(&id, Some(&row));
                                }
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "background list revalidation failed, non-fatal");
                        }
                    }
                });
                if !self.cache.is_empty() {
                    Ok(self.cache.present_values())
                } else {
                    self.backend.get_all_remote(query).await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ripple_core::SyncStatus;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tokio::sync::watch;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Widget {
        id: u64,
        name: String,
    }

    impl Entity for Widget {
        type Id = u64;
        fn id(&self) -> u64 {
            self.id
        }
        fn type_name() -> &'static str {
            "widget"
        }
    }

    struct FakeBackend {
        remote: Mutex<std::collections::HashMap<u64, Widget>>,
        remote_calls: AtomicU64,
    }

    #[async_trait]
    impl Backend<Widget> for FakeBackend {
        async fn initialize(&self) -> RippleResult<()> {
            Ok(())
        }
        async fn dispose(&self) -> RippleResult<()> {
            Ok(())
        }
        async fn get_local(&self, id: &u64) -> RippleResult<Option<Widget>> {
            Ok(self.remote.lock().unwrap().get(id).cloned())
        }
        async fn get_all_local(&self, _query: Option<&Query>) -> RippleResult<Vec<Widget>> {
            Ok(self.remote.lock().unwrap().values().cloned().collect())
        }
        async fn save_local(&self, _item: &Widget) -> RippleResult<()> {
            Ok(())
        }
        async fn delete_local(&self, _id: &u64) -> RippleResult<bool> {
            Ok(true)
        }
        fn watch_local(&self, _query: Option<Query>) -> watch::Receiver<Vec<Widget>> {
            watch::channel(Vec::new()).1
        }
        async fn get_remote(&self, id: &u64) -> RippleResult<Option<Widget>> {
            self.remote_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.remote.lock().unwrap().get(id).cloned())
        }
        async fn get_all_remote(&self, _query: Option<&Query>) -> RippleResult<Vec<Widget>> {
            Ok(self.remote.lock().unwrap().values().cloned().collect())
        }
        async fn save_remote(&self, item: &Widget) -> RippleResult<Widget> {
            Ok(item.clone())
        }
        async fn delete_remote(&self, _id: &u64) -> RippleResult<bool> {
            Ok(true)
        }
        async fn sync(&self) -> RippleResult<()> {
            Ok(())
        }
        fn pending_changes_count(&self) -> u64 {
            0
        }
        fn sync_status(&self) -> watch::Receiver<SyncStatus> {
            watch::channel(SyncStatus::Synced).1
        }
        fn is_connected(&self) -> watch::Receiver<bool> {
            watch::channel(true).1
        }
        fn to_json(&self, item: &Widget) -> RippleResult<serde_json::Value> {
            Ok(serde_json::to_value(item).unwrap())
        }
        fn from_json(&self, value: serde_json::Value) -> RippleResult<Widget> {
            Ok(serde_json::from_value(value).unwrap())
        }
        fn name(&self) -> &'static str {
            "fake"
        }
        fn capabilities(&self) -> crate::backend::BackendCapabilities {
            crate::backend::BackendCapabilities::default()
        }
    }

    fn fake_backend_with(id: u64, name: &str) -> Arc<FakeBackend> {
        let mut map = std::collections::HashMap::new();
        map.insert(
            id,
            Widget {
                id,
                name: name.to_string(),
            },
        );
        Arc::new(FakeBackend {
            remote: Mutex::new(map),
            remote_calls: AtomicU64::new(0),
        })
    }

    #[tokio::test]
    async fn cache_first_skips_remote_when_fresh() {
        let backend = fake_backend_with(1, "sprocket");
        let cache = Arc::new(CacheStore::<Widget>::new());
        cache.put_value(
            1,
            Widget {
                id: 1,
                name: "cached".into(),
            },
            CacheOrigin::Remote,
            None,
        );
        let engine = FetchEngine::new(backend.clone(), cache, None, None);

        let result = engine.get(&1, FetchPolicy::CacheFirst).await.unwrap();
        assert_eq!(result.unwrap().name, "cached");
        assert_eq!(backend.remote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_first_falls_back_to_remote_on_miss() {
        let backend = fake_backend_with(1, "sprocket");
        let cache = Arc::new(CacheStore::<Widget>::new());
        let engine = FetchEngine::new(backend.clone(), cache.clone(), None, None);

        let result = engine.get(&1, FetchPolicy::CacheFirst).await.unwrap();
        assert_eq!(result.unwrap().name, "sprocket");
        assert_eq!(backend.remote_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&1).unwrap().value.unwrap().name, "sprocket");
    }

    struct RecordingObserver {
        seen: Arc<Mutex<Vec<(u64, Option<Widget>)>>>,
    }

    impl CacheObserver<Widget> for RecordingObserver {
        fn on_update(&self, id: &u64, value: Option<&Widget>) {
            self.seen.lock().unwrap().push((*id, value.cloned()));
        }
    }

    #[tokio::test]
    async fn get_all_cache_and_network_writes_background_fetch_into_cache_and_notifies() {
        let backend = fake_backend_with(1, "sprocket");
        let cache = Arc::new(CacheStore::<Widget>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = FetchEngine::new(
            backend,
            cache.clone(),
            None,
            Some(Arc::new(RecordingObserver { seen: seen.clone() })),
        );

        let first = engine.get_all(None, FetchPolicy::CacheAndNetwork).await.unwrap();
        assert_eq!(first.len(), 1);

        for _ in 0..50 {
            if cache.get(&1).is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(cache.get(&1).unwrap().value.unwrap().name, "sprocket");
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&(
                1,
                Some(Widget {
                    id: 1,
                    name: "sprocket".into(),
                })
            ))
        );
    }

    #[tokio::test]
    async fn cache_only_never_touches_remote() {
        let backend = fake_backend_with(1, "sprocket");
        let cache = Arc::new(CacheStore::<Widget>::new());
        let engine = FetchEngine::new(backend.clone(), cache, None, None);

        let result = engine.get(&1, FetchPolicy::CacheOnly).await.unwrap();
        assert!(result.is_none());
        assert_eq!(backend.remote_calls.load(Ordering::SeqCst), 0);
    }
}
