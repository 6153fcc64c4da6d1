//! The entity contract the engine requires from callers, and the cache/queue
//! value types built on top of it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::identifier::Identifier;

/// The contract a type `T` must satisfy to be managed by a store.
///
/// Implementations must provide a stable identifier and a JSON-shaped
/// encoding; equality is used by the reactive fan-out to suppress
/// successive emissions of an unchanged value.
pub trait Entity: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The identifier type for this entity.
    type Id: Identifier;

    /// Extract this entity's identifier.
    fn id(&self) -> Self::Id;

    /// A stable name for this entity type, used by query-stream keys,
    /// invalidation-by-tag bookkeeping, and audit entries.
    fn type_name() -> &'static str;
}

/// Where a cached value most recently came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOrigin {
    /// Populated by a successful remote fetch or write.
    Remote,
    /// Populated by a local-only write (`cacheOnly` policy).
    Local,
    /// Populated by an optimistic write still awaiting remote confirmation.
    Optimistic,
}

/// A cached value bundled with the metadata the policy engine needs to
/// decide whether it's fresh, and the reactive fan-out needs to know where
/// it came from.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct CacheEntry<T> {
    /// The cached value, or `None` for a tombstone (known absence).
    pub value: Option<T>,
    /// When this entry was written into the cache.
    pub fetched_at: DateTime<Utc>,
    /// When this entry becomes stale, if staleness is tracked for it.
    pub stale_at: Option<DateTime<Utc>>,
    /// Where the value currently in this entry came from.
    pub origin: CacheOrigin,
    /// Invalidation tags attached at write time.
    pub tags: std::collections::BTreeSet<String>,
}

impl<T> CacheEntry<T> {
    /// Construct a fresh entry with no staleness horizon and no tags.
    pub fn new(value: Option<T>, origin: CacheOrigin) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            stale_at: None,
            origin,
            tags: std::collections::BTreeSet::new(),
        }
    }

    /// A cached entry counts as "present" for fetch-policy purposes if it
    /// holds a value, or if it's a recorded tombstone (an explicit
    /// known-absent marker rather than "never fetched").
    pub fn is_present(&self) -> bool {
        self.value.is_some() || self.is_tombstone()
    }

    /// True if this entry records a known deletion rather than an unknown
    /// (never-cached) state.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none() && self.fetched_at > DateTime::<Utc>::UNIX_EPOCH
    }

    /// Whether this entry is stale as of `now`, given its `stale_at`
    /// horizon. Absence of `stale_at` means "never stale".
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.stale_at {
            Some(stale_at) => now >= stale_at,
            None => false,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn with_stale_at(mut self, stale_at: DateTime<Utc>) -> Self {
        self.stale_at = Some(stale_at);
        self
    }
}

/// The kind of write a pending change represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOp {
    Save,
    Delete,
}

/// A write accepted locally but not yet confirmed by the remote path.
///
/// A change is outstanding until either the remote path confirms it or a
/// later change with the same id replaces it. `cacheOnly` writes never
/// produce a `PendingChange`.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct PendingChange<T, ID> {
    pub op: PendingOp,
    pub id: ID,
    pub snapshot_before: Option<T>,
    pub snapshot_after: Option<T>,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
}

impl<T, ID> PendingChange<T, ID> {
    pub fn save(id: ID, snapshot_before: Option<T>, snapshot_after: T) -> Self {
        let now = Utc::now();
        Self {
            op: PendingOp::Save,
            id,
            snapshot_before,
            snapshot_after: Some(snapshot_after),
            enqueued_at: now,
            attempts: 0,
            next_attempt_at: now,
        }
    }

    pub fn delete(id: ID, snapshot_before: Option<T>) -> Self {
        let now = Utc::now();
        Self {
            op: PendingOp::Delete,
            id,
            snapshot_before,
            snapshot_after: None,
            enqueued_at: now,
            attempts: 0,
            next_attempt_at: now,
        }
    }

    /// A change is outstanding until confirmed or replaced; the sync queue
    /// only ever holds outstanding changes, so membership in the queue is
    /// itself the outstanding predicate. This accessor exists for callers
    /// holding a change outside the queue (e.g. mid-flight in the sync
    /// loop) who still need to ask the question.
    pub fn is_outstanding(&self) -> bool {
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_attempt(&mut self, next_attempt_at: DateTime<Utc>) {
        self.attempts += 1;
        self.next_attempt_at = next_attempt_at;
    }
}

impl fmt::Display for PendingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingOp::Save => write!(f, "save"),
            PendingOp::Delete => write!(f, "delete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_counts_as_present() {
        let entry: CacheEntry<String> = CacheEntry::new(None, CacheOrigin::Remote);
        assert!(entry.is_present());
        assert!(entry.is_tombstone());
    }

    #[test]
    fn value_counts_as_present() {
        let entry = CacheEntry::new(Some("x".to_string()), CacheOrigin::Remote);
        assert!(entry.is_present());
        assert!(!entry.is_tombstone());
    }

    #[test]
    fn staleness_absent_by_default() {
        let entry = CacheEntry::new(Some(1), CacheOrigin::Remote);
        assert!(!entry.is_stale(Utc::now() + chrono::Duration::days(365)));
    }

    #[test]
    fn staleness_horizon_respected() {
        let now = Utc::now();
        let entry = CacheEntry::new(Some(1), CacheOrigin::Remote)
            .with_stale_at(now + chrono::Duration::seconds(10));
        assert!(!entry.is_stale(now));
        assert!(entry.is_stale(now + chrono::Duration::seconds(11)));
    }

    #[test]
    fn pending_change_save_tracks_snapshots() {
        let change = PendingChange::save(1u64, Some("old".to_string()), "new".to_string());
        assert_eq!(change.snapshot_before, Some("old".to_string()));
        assert_eq!(change.snapshot_after, Some("new".to_string()));
        assert_eq!(change.attempts(), 0);
    }
}
