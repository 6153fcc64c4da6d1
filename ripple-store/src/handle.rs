//! `StoreHandle<T, B>`: the public facade that wires the fetch/write policy
//! engines, the reactive index, the sync loop, and the optional compliance
//! spine behind one API. Construction takes a `Backend` impl and a
//! `StoreConfig`; everything else (cache, queue, reactive index) is owned
//! exclusively by the handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use ripple_core::{
    Entity, ErrorKind, LifecycleError, MetricsReporter, NullReporter, Query, RippleError,
    RippleResult, StoreConfig, SyncMode, SyncStatus,
};
use ripple_reactive::ReactiveIndex;
use ripple_saga::TransactionalStore;
use ripple_storage::{Backend, CacheStore, FetchEngine, PendingQueue, WriteEngine};
use ripple_sync::SyncEngine;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::bridge::ReactiveBridge;
use crate::interceptor::{InterceptorChain, OpContext, OpKind};
use crate::lifecycle::{Lifecycle, LifecycleState};

/// Active field-level encryption: the set of field names to transform and
/// the cipher to transform them with. `None` means field-level encryption
/// is off (database-level, if configured, is entirely the backend's
/// concern and needs no wiring here).
pub struct EncryptionSettings {
    pub fields: Vec<String>,
    pub cipher: Arc<dyn ripple_compliance::FieldCipher>,
}

pub struct StoreHandle<T: Entity, B: Backend<T>> {
    backend: Arc<B>,
    cache: Arc<CacheStore<T>>,
    queue: Arc<PendingQueue<T>>,
    reactive: Arc<ReactiveIndex<T>>,
    fetch_engine: FetchEngine<T, B>,
    write_engine: WriteEngine<T, B>,
    sync_engine: Arc<SyncEngine<T, B>>,
    config: StoreConfig,
    lifecycle: Lifecycle,
    interceptors: InterceptorChain,
    metrics: Arc<dyn MetricsReporter>,
    audit: Option<Arc<dyn ripple_compliance::AuditLog>>,
    encryption: Option<EncryptionSettings>,
    sync_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    sync_task_stop: Arc<AtomicBool>,
}

impl<T: Entity, B: Backend<T> + 'static> StoreHandle<T, B> {
    pub fn new(backend: Arc<B>, config: StoreConfig) -> Self {
        let cache = Arc::new(CacheStore::new());
        let queue = Arc::new(PendingQueue::new());
        let reactive = Arc::new(ReactiveIndex::new());
        let bridge: Arc<dyn ripple_storage::CacheObserver<T>> =
            Arc::new(ReactiveBridge::new(reactive.clone(), cache.clone()));

        let fetch_engine = FetchEngine::new(
            backend.clone(),
            cache.clone(),
            config.default_staleness,
            Some(bridge.clone()),
        );
        let write_engine = WriteEngine::new(
            backend.clone(),
            cache.clone(),
            queue.clone(),
            config.default_staleness,
            config.conflict_resolution,
            Some(bridge.clone()),
        );
        let sync_engine = Arc::new(SyncEngine::new(
            backend.clone(),
            cache.clone(),
            queue.clone(),
            config.retry.clone(),
            config.conflict_resolution,
            backend.is_connected(),
            Some(bridge),
        ));

        Self {
            backend,
            cache,
            queue,
            reactive,
            fetch_engine,
            write_engine,
            sync_engine,
            config,
            lifecycle: Lifecycle::new(),
            interceptors: InterceptorChain::new(),
            metrics: Arc::new(NullReporter),
            audit: None,
            encryption: None,
            sync_task: Mutex::new(None),
            sync_task_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsReporter>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn ripple_compliance::AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_encryption(mut self, fields: Vec<String>, cipher: Arc<dyn ripple_compliance::FieldCipher>) -> Self {
        self.encryption = Some(EncryptionSettings { fields, cipher });
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync_engine.status()
    }

    pub fn pending_changes_count(&self) -> u64 {
        self.sync_engine.pending_count()
    }

    /// Brings the store from `Created` to `Ready`: initializes the backend
    /// and, if `sync_mode` calls for it, spawns the background sync loop.
    #[instrument(skip(self), fields(entity = T::type_name()))]
    pub async fn initialize(&self) -> RippleResult<()> {
        if self.lifecycle.get() != LifecycleState::Created {
            return Err(RippleError::Lifecycle(LifecycleError::NotReady {
                reason: "already initialized",
            }));
        }
        self.lifecycle.set(LifecycleState::Initializing);
        self.backend.initialize().await?;
        self.lifecycle.set(LifecycleState::Ready);
        self.spawn_sync_loop();
        Ok(())
    }

    fn spawn_sync_loop(&self) {
        let interval = self.config.periodic_sync_interval;
        let sync_engine = self.sync_engine.clone();
        let stop = self.sync_task_stop.clone();
        let handle = match self.config.sync_mode {
            SyncMode::Periodic => Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    if let Err(err) = sync_engine.run_once().await {
                        warn!(error = %err, "periodic sync cycle failed, will retry next tick");
                    }
                }
            })),
            // Realtime has no push channel from the backend to select on in
            // this generic facade, so it's approximated as a tight-interval
            // loop rather than a true push-driven one; `EventDriven`/`Manual`
            // rely entirely on the caller invoking `sync()`.
            SyncMode::Realtime => Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_millis(250));
                loop {
                    ticker.tick().await;
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    if let Err(err) = sync_engine.run_once().await {
                        warn!(error = %err, "realtime sync cycle failed, will retry next tick");
                    }
                }
            })),
            SyncMode::Manual | SyncMode::EventDriven | SyncMode::Disabled => None,
        };
        *self.sync_task.lock().expect("sync task lock poisoned") = handle;
    }

    /// The single cancellation root: stops the sync loop, closes every
    /// replay channel (subscribers see a terminal signal), and disposes the
    /// backend. Idempotent once `Disposed`.
    #[instrument(skip(self), fields(entity = T::type_name()))]
    pub async fn dispose(&self) -> RippleResult<()> {
        if self.lifecycle.get() == LifecycleState::Disposed {
            return Ok(());
        }
        self.lifecycle.set(LifecycleState::Disposing);
        self.sync_task_stop.store(true, Ordering::Release);
        if let Some(task) = self.sync_task.lock().expect("sync task lock poisoned").take() {
            task.abort();
        }
        self.reactive.close_all();
        self.backend.dispose().await?;
        self.lifecycle.set(LifecycleState::Disposed);
        Ok(())
    }

    fn entity_query(&self) -> &'static str {
        T::type_name()
    }

    async fn audit_log(&self, action: ripple_compliance::AuditAction, entity_id: Option<String>, success: bool) {
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.append(None, action, self.entity_query(), entity_id, success).await {
                warn!(error = %err, "failed to append audit entry");
            }
        }
    }

    fn record_duration(&self, op: &'static str, started: Instant) {
        self.metrics.record_duration(op, started.elapsed());
    }

    fn encrypt_for_backend(&self, item: T) -> RippleResult<T> {
        let Some(settings) = &self.encryption else {
            return Ok(item);
        };
        let mut json = self.backend.to_json(&item)?;
        if let Value::Object(map) = &mut json {
            for field in &settings.fields {
                if let Some(value) = map.get(field) {
                    if !value.is_string() {
                        continue;
                    }
                    let plaintext = value.as_str().unwrap_or_default().as_bytes().to_vec();
                    let wire = ripple_compliance::encrypt_field(settings.cipher.as_ref(), &plaintext)?;
                    map.insert(field.clone(), Value::String(wire));
                }
            }
        }
        self.backend.from_json(json)
    }

    fn decrypt_from_backend(&self, item: T) -> RippleResult<T> {
        let Some(settings) = &self.encryption else {
            return Ok(item);
        };
        let mut json = self.backend.to_json(&item)?;
        if let Value::Object(map) = &mut json {
            for field in &settings.fields {
                if let Some(Value::String(wire)) = map.get(field) {
                    let plaintext = ripple_compliance::decrypt_field(settings.cipher.as_ref(), wire)?;
                    let decoded = String::from_utf8(plaintext).map_err(|_| {
                        RippleError::Crypto(ripple_core::CryptoError::MalformedEnvelope {
                            field: field.clone(),
                            reason: "decrypted payload was not valid utf-8".into(),
                        })
                    })?;
                    map.insert(field.clone(), Value::String(decoded));
                }
            }
        }
        self.backend.from_json(json)
    }

    async fn run_interceptors_before(&self, ctx: &mut OpContext) -> RippleResult<Option<Value>> {
        if self.interceptors.is_empty() {
            return Ok(None);
        }
        self.interceptors.run_before(ctx).await
    }

    #[instrument(skip(self), fields(entity = T::type_name(), id = ?id))]
    pub async fn get(&self, id: &T::Id, policy: Option<ripple_core::FetchPolicy>) -> RippleResult<Option<T>> {
        self.lifecycle.require_ready("get")?;
        let started = Instant::now();
        let mut ctx = OpContext::new(OpKind::Get, T::type_name(), Value::String(format!("{id:?}")));
        let result: RippleResult<Option<T>> = async {
            if let Some(short_circuit) = self.run_interceptors_before(&mut ctx).await? {
                return Ok(serde_json::from_value(short_circuit).unwrap_or(None));
            }
            let policy = policy.unwrap_or(self.config.fetch_policy);
            let value = self.fetch_engine.get(id, policy).await?;
            match value {
                Some(v) => self.decrypt_from_backend(v).map(Some),
                None => Ok(None),
            }
        }
        .await;

        self.record_duration("store.get", started);
        match &result {
            Ok(value) => {
                let _ = self
                    .interceptors
                    .run_after(&mut ctx, &serde_json::to_value(value).unwrap_or(Value::Null))
                    .await;
                self.audit_log(ripple_compliance::AuditAction::Read, Some(format!("{id:?}")), true)
                    .await;
            }
            Err(err) => {
                self.interceptors.run_on_error(&mut ctx, err).await;
                self.audit_log(ripple_compliance::AuditAction::Read, Some(format!("{id:?}")), false)
                    .await;
            }
        }
        result
    }

    #[instrument(skip(self, query), fields(entity = T::type_name()))]
    pub async fn get_all(&self, query: Option<&Query>, policy: Option<ripple_core::FetchPolicy>) -> RippleResult<Vec<T>> {
        self.lifecycle.require_ready("get_all")?;
        let started = Instant::now();
        let policy = policy.unwrap_or(self.config.fetch_policy);
        let raw = self.fetch_engine.get_all(query, policy).await?;
        let decrypted: RippleResult<Vec<T>> = raw.into_iter().map(|item| self.decrypt_from_backend(item)).collect();
        let decrypted = decrypted?;
        self.record_duration("store.get_all", started);
        Ok(apply_query_ordering(query, decrypted))
    }

    #[instrument(skip(self), fields(entity = T::type_name(), id = ?id))]
    pub fn watch(&self, id: &T::Id) -> RippleResult<watch::Receiver<Option<T>>> {
        self.lifecycle.require_ready("watch")?;
        let current = self.cache.get(id).and_then(|e| e.value);
        Ok(self.reactive.watch_item(id, current))
    }

    #[instrument(skip(self, query), fields(entity = T::type_name()))]
    pub fn watch_all(&self, query: Option<Query>) -> RippleResult<watch::Receiver<Vec<T>>> {
        self.lifecycle.require_ready("watch_all")?;
        let query = query.unwrap_or_default();
        let current = apply_query_ordering(Some(&query), self.cache.present_values());
        Ok(self.reactive.watch_query(query, current))
    }

    #[instrument(skip(self, item), fields(entity = T::type_name()))]
    pub async fn save(&self, item: T, policy: Option<ripple_core::WritePolicy>) -> RippleResult<T> {
        self.lifecycle.require_ready("save")?;
        let started = Instant::now();
        let id = item.id();
        let policy = policy.unwrap_or(self.config.write_policy);
        let outbound = self.encrypt_for_backend(item)?;
        let result = self.write_engine.save(outbound, policy).await;
        self.record_duration("store.save", started);
        match &result {
            Ok(saved) => {
                self.audit_log(ripple_compliance::AuditAction::Create, Some(format!("{id:?}")), true)
                    .await;
                let decrypted = self.decrypt_from_backend(saved.clone())?;
                return Ok(decrypted);
            }
            Err(_) => {
                self.audit_log(ripple_compliance::AuditAction::Create, Some(format!("{id:?}")), false)
                    .await;
            }
        }
        result
    }

    /// Best-effort atomic from the cache's viewpoint: a failure
    /// mid-batch leaves already-applied successes in place. The failing
    /// index is carried on the tracing span rather than the `Result` type,
    /// since the per-item error is already a fully-typed `RippleError` and
    /// batch position is diagnostic context around it, not part of the
    /// operation's outcome type.
    #[instrument(skip(self, items), fields(entity = T::type_name(), count = items.len()))]
    pub async fn save_all(&self, items: Vec<T>, policy: Option<ripple_core::WritePolicy>) -> RippleResult<Vec<T>> {
        self.lifecycle.require_ready("save_all")?;
        let mut saved = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match self.save(item, policy).await {
                Ok(value) => saved.push(value),
                Err(err) => {
                    warn!(index, error = %err, "save_all failed at index, prior successes remain applied");
                    return Err(err);
                }
            }
        }
        Ok(saved)
    }

    #[instrument(skip(self), fields(entity = T::type_name(), id = ?id))]
    pub async fn delete(&self, id: &T::Id, policy: Option<ripple_core::WritePolicy>) -> RippleResult<bool> {
        self.lifecycle.require_ready("delete")?;
        let started = Instant::now();
        let policy = policy.unwrap_or(self.config.write_policy);
        let result = self.write_engine.delete(id.clone(), policy).await;
        self.record_duration("store.delete", started);
        self.audit_log(
            ripple_compliance::AuditAction::Delete,
            Some(format!("{id:?}")),
            result.is_ok(),
        )
        .await;
        result
    }

    #[instrument(skip(self, ids), fields(entity = T::type_name(), count = ids.len()))]
    pub async fn delete_all(&self, ids: Vec<T::Id>, policy: Option<ripple_core::WritePolicy>) -> RippleResult<u64> {
        self.lifecycle.require_ready("delete_all")?;
        let mut deleted = 0u64;
        for (index, id) in ids.iter().enumerate() {
            match self.delete(id, policy).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(index, error = %err, "delete_all failed at index, prior deletions remain applied");
                    return Err(err);
                }
            }
        }
        Ok(deleted)
    }

    #[instrument(skip(self), fields(entity = T::type_name()))]
    pub async fn sync(&self) -> RippleResult<()> {
        self.lifecycle.require_ready("sync")?;
        self.sync_engine.run_once().await
    }

    #[instrument(skip(self), fields(entity = T::type_name(), id = ?id))]
    pub fn invalidate(&self, id: &T::Id) -> RippleResult<()> {
        self.lifecycle.require_ready("invalidate")?;
        self.cache.forget(id);
        Ok(())
    }

    #[instrument(skip(self), fields(entity = T::type_name()))]
    pub fn invalidate_all(&self, tag: Option<&str>) -> RippleResult<u64> {
        self.lifecycle.require_ready("invalidate_all")?;
        Ok(self.cache.invalidate_all(tag))
    }
}

/// Enforce the `get_all`/`watch_all` ordering contract — ordered by the
/// query's order-by clauses, then stable by id — regardless of whether
/// the source was the cache (unfiltered) or the backend (already filtered
/// and ordered by its own query engine) — re-applying the filter here is a
/// no-op for already-conformant results and the only correct behavior for
/// cache-sourced ones.
fn apply_query_ordering<T: Entity>(query: Option<&Query>, mut items: Vec<T>) -> Vec<T> {
    items.sort_by_key(|item| item.id());
    let Some(query) = query else {
        return items;
    };
    let as_json: Vec<Value> = items.iter().map(|i| serde_json::to_value(i).unwrap_or(Value::Null)).collect();
    ripple_reactive::query_eval::select(query, &as_json)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

#[async_trait]
impl<T: Entity, B: Backend<T> + 'static> TransactionalStore<T> for StoreHandle<T, B> {
    async fn get(&self, id: &T::Id) -> RippleResult<Option<T>> {
        StoreHandle::get(self, id, None).await
    }

    async fn save(&self, item: T) -> RippleResult<T> {
        StoreHandle::save(self, item, None).await
    }

    async fn delete(&self, id: &T::Id) -> RippleResult<bool> {
        StoreHandle::delete(self, id, None).await
    }
}

/// Classify whether `err`'s kind still allows the caller to treat a store
/// as usable, used by test harnesses asserting the universal "after
/// dispose, every op raises not-ready" property.
pub fn is_not_ready(err: &RippleError) -> bool {
    err.kind() == ErrorKind::NotReady
}
