//! A generic in-memory `Backend<T>` usable for any entity type: a single
//! `RwLock<HashMap<Id, Entity>>`, since this backend plays both "local" and
//! "remote" tiers at once.
//!
//! Unlike the minimal per-crate `InMemoryBackend` test doubles scattered
//! through `ripple-storage`/`ripple-sync`/`ripple-compliance` (each only
//! implements what its own engine's tests exercise), this one applies real
//! query filtering/ordering to `get_all_local`/`get_all_remote` via
//! `ripple_reactive::query_eval`, so it's a fair stand-in for a real backend
//! in integration tests that exercise the query path end to end.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ripple_core::{Entity, Query, RippleResult, SyncStatus};
use ripple_storage::{Backend, BackendCapabilities};
use serde_json::Value;
use tokio::sync::watch;

pub struct InMemoryBackend<T: Entity> {
    rows: RwLock<HashMap<T::Id, T>>,
    connected: watch::Sender<bool>,
    capabilities: BackendCapabilities,
}

impl<T: Entity> InMemoryBackend<T> {
    pub fn new() -> Arc<Self> {
        Self::with_capabilities(BackendCapabilities::default())
    }

    pub fn with_capabilities(capabilities: BackendCapabilities) -> Arc<Self> {
        let (connected, _) = watch::channel(true);
        Arc::new(Self {
            rows: RwLock::new(HashMap::new()),
            connected,
            capabilities,
        })
    }

    /// Prepopulate the backend, bypassing the `Backend` trait (as if the
    /// remote already held these rows before the store was constructed).
    pub fn seed(&self, items: impl IntoIterator<Item = T>) {
        let mut rows = self.rows.write().expect("in-memory backend lock poisoned");
        for item in items {
            rows.insert(item.id(), item);
        }
    }

    /// Flip the connectivity flag observed through `is_connected`, for
    /// tests of offline/reconnect behavior.
    pub fn set_connected(&self, connected: bool) {
        let _ = self.connected.send(connected);
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().expect("in-memory backend lock poisoned").len()
    }

    fn filtered(&self, query: Option<&Query>) -> Vec<T> {
        let rows = self.rows.read().expect("in-memory backend lock poisoned");
        let mut all: Vec<T> = rows.values().cloned().collect();
        all.sort_by_key(|item| item.id());
        let Some(query) = query else { return all };
        let as_json: Vec<Value> = all.iter().map(|i| serde_json::to_value(i).unwrap_or(Value::Null)).collect();
        ripple_reactive::query_eval::select(query, &as_json)
            .into_iter()
            .map(|i| all[i].clone())
            .collect()
    }
}

#[async_trait]
impl<T: Entity> Backend<T> for InMemoryBackend<T> {
    async fn initialize(&self) -> RippleResult<()> {
        Ok(())
    }

    async fn dispose(&self) -> RippleResult<()> {
        Ok(())
    }

    async fn get_local(&self, id: &T::Id) -> RippleResult<Option<T>> {
        Ok(self.rows.read().expect("in-memory backend lock poisoned").get(id).cloned())
    }

    async fn get_all_local(&self, query: Option<&Query>) -> RippleResult<Vec<T>> {
        Ok(self.filtered(query))
    }

    async fn save_local(&self, item: &T) -> RippleResult<()> {
        self.rows.write().expect("in-memory backend lock poisoned").insert(item.id(), item.clone());
        Ok(())
    }

    async fn delete_local(&self, id: &T::Id) -> RippleResult<bool> {
        Ok(self.rows.write().expect("in-memory backend lock poisoned").remove(id).is_some())
    }

    fn watch_local(&self, _query: Option<Query>) -> watch::Receiver<Vec<T>> {
        watch::channel(Vec::new()).1
    }

    async fn get_remote(&self, id: &T::Id) -> RippleResult<Option<T>> {
        self.get_local(id).await
    }

    async fn get_all_remote(&self, query: Option<&Query>) -> RippleResult<Vec<T>> {
        self.get_all_local(query).await
    }

    async fn save_remote(&self, item: &T) -> RippleResult<T> {
        self.save_local(item).await?;
        Ok(item.clone())
    }

    async fn delete_remote(&self, id: &T::Id) -> RippleResult<bool> {
        self.delete_local(id).await
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
        self.connected.subscribe()
    }

    fn to_json(&self, item: &T) -> RippleResult<Value> {
        Ok(serde_json::to_value(item).unwrap_or(Value::Null))
    }

    fn from_json(&self, value: Value) -> RippleResult<T> {
        serde_json::from_value(value).map_err(|e| {
            ripple_core::RippleError::Unknown(format!("in-memory backend: malformed entity json: {e}"))
        })
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{Filter, OrderBy};

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Widget {
        id: u64,
        status: String,
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

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let backend = InMemoryBackend::<Widget>::new();
        let widget = Widget {
            id: 1,
            status: "active".into(),
        };
        backend.save_remote(&widget).await.unwrap();
        assert_eq!(backend.get_local(&1).await.unwrap(), Some(widget));
    }

    #[tokio::test]
    async fn get_all_remote_applies_the_query() {
        let backend = InMemoryBackend::<Widget>::new();
        backend.seed([
            Widget { id: 1, status: "active".into() },
            Widget { id: 2, status: "inactive".into() },
        ]);
        let query = Query::new().filter(Filter::eq("status", serde_json::json!("active")));
        let result = backend.get_all_remote(Some(&query)).await.unwrap();
        assert_eq!(result, vec![Widget { id: 1, status: "active".into() }]);
    }

    #[tokio::test]
    async fn get_all_remote_orders_and_paginates() {
        let backend = InMemoryBackend::<Widget>::new();
        backend.seed([
            Widget { id: 2, status: "b".into() },
            Widget { id: 1, status: "a".into() },
            Widget { id: 3, status: "c".into() },
        ]);
        let query = Query::new().order_by(OrderBy::asc("status")).limit(2);
        let result = backend.get_all_remote(Some(&query)).await.unwrap();
        assert_eq!(result.into_iter().map(|w| w.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn get_all_remote_with_no_order_by_is_stably_ordered_by_id() {
        let backend = InMemoryBackend::<Widget>::new();
        backend.seed([
            Widget { id: 3, status: "c".into() },
            Widget { id: 1, status: "a".into() },
            Widget { id: 2, status: "b".into() },
        ]);
        let result = backend.get_all_remote(None).await.unwrap();
        assert_eq!(result.into_iter().map(|w| w.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn set_connected_toggles_is_connected() {
        let backend = InMemoryBackend::<Widget>::new();
        let mut rx = backend.is_connected();
        assert!(*rx.borrow());
        backend.set_connected(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }
}
