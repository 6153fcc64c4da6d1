//! The backend interface each storage driver implements, consumed by the
//! engine through dynamic dispatch-friendly `async_trait` methods: a single
//! contract covering local cache persistence, remote reads/writes, and
//! wire (de)serialization, so any driver can be swapped in without
//! changing the engine above it.

use async_trait::async_trait;
use ripple_core::{Entity, Query, RippleResult, SyncStatus};
use tokio::sync::watch;

/// Capability flags a backend advertises so the policy engines and the
/// store facade can decide what they can ask of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    pub offline: bool,
    pub realtime: bool,
    pub transactions: bool,
    pub field_ops: bool,
}

/// A storage driver for entities of type `T`.
///
/// Behavioral contract: `save_local` must make the new value visible to the
/// next `get_local` and cause `watch_local` to re-emit. Remote operations
/// must raise `network` for a transient failure, `timeout` for an exceeded
/// deadline, `conflict` for a server-detected version mismatch, and
/// `authentication`/`authorization` for credential or permission failures —
/// the store facade relies on these kinds to decide retry/rollback behavior.
#[async_trait]
pub trait Backend<T: Entity>: Send + Sync {
    async fn initialize(&self) -> RippleResult<()>;
    async fn dispose(&self) -> RippleResult<()>;

    async fn get_local(&self, id: &T::Id) -> RippleResult<Option<T>>;
    async fn get_all_local(&self, query: Option<&Query>) -> RippleResult<Vec<T>>;
    async fn save_local(&self, item: &T) -> RippleResult<()>;
    async fn delete_local(&self, id: &T::Id) -> RippleResult<bool>;
    /// A replayed stream of the full local result set for `query` (`None`
    /// means unconstrained), re-emitted on every local mutation that could
    /// affect it.
    fn watch_local(&self, query: Option<Query>) -> watch::Receiver<Vec<T>>;

    async fn get_remote(&self, id: &T::Id) -> RippleResult<Option<T>>;
    async fn get_all_remote(&self, query: Option<&Query>) -> RippleResult<Vec<T>>;
    async fn save_remote(&self, item: &T) -> RippleResult<T>;
    async fn delete_remote(&self, id: &T::Id) -> RippleResult<bool>;

    async fn sync(&self) -> RippleResult<()>;
    fn pending_changes_count(&self) -> u64;
    fn sync_status(&self) -> watch::Receiver<SyncStatus>;
    fn is_connected(&self) -> watch::Receiver<bool>;

    fn id_of(&self, item: &T) -> T::Id {
        item.id()
    }
    fn to_json(&self, item: &T) -> RippleResult<serde_json::Value>;
    fn from_json(&self, value: serde_json::Value) -> RippleResult<T>;
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> BackendCapabilities;

    /// Lazy-field read for backends that advertise `field_ops`. The default
    /// implementation returns `Ok(None)` for backends that don't.
    async fn get_field(
        &self,
        _id: &T::Id,
        _field: &str,
    ) -> RippleResult<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Batched form of `get_field`.
    async fn get_field_batch(
        &self,
        ids: &[T::Id],
        _field: &str,
    ) -> RippleResult<Vec<Option<serde_json::Value>>> {
        Ok(ids.iter().map(|_| None).collect())
    }
}
