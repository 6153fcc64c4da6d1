//! The in-memory cache, owned exclusively by the store facade: no other
//! component reads or writes it directly. No tenant scoping; staleness is
//! tracked per-entry via `CacheEntry::stale_at`, matching the fetch-policy
//! engine's `stale_duration` model rather than a separate change-journal
//! watermark.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use ripple_core::{CacheEntry, CacheOrigin, Entity};

/// A thread-safe, id-keyed cache of `CacheEntry<T>` values.
pub struct CacheStore<T: Entity> {
    entries: RwLock<HashMap<T::Id, CacheEntry<T>>>,
}

impl<T: Entity> Default for CacheStore<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Entity> CacheStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &T::Id) -> Option<CacheEntry<T>> {
        self.entries.read().expect("cache lock poisoned").get(id).cloned()
    }

    /// Insert or replace the entry for `id`, applying `default_staleness`
    /// (if set and the entry doesn't already carry its own `stale_at`).
    pub fn put(&self, id: T::Id, mut entry: CacheEntry<T>, default_staleness: Option<std::time::Duration>) {
        if entry.stale_at.is_none() {
            if let Some(horizon) = default_staleness {
                if let Ok(horizon) = chrono::Duration::from_std(horizon) {
                    entry.stale_at = Some(entry.fetched_at + horizon);
                }
            }
        }
        self.entries.write().expect("cache lock poisoned").insert(id, entry);
    }

    pub fn put_value(
        &self,
        id: T::Id,
        value: T,
        origin: CacheOrigin,
        default_staleness: Option<std::time::Duration>,
    ) {
        self.put(id, CacheEntry::new(Some(value), origin), default_staleness);
    }

    /// Record a tombstone (a known deletion) for `id`.
    pub fn put_tombstone(&self, id: T::Id, origin: CacheOrigin) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(id, CacheEntry::new(None, origin));
    }

    /// Remove the entry entirely (distinct from a tombstone: this makes the
    /// id "never cached" again rather than "known absent").
    pub fn forget(&self, id: &T::Id) {
        self.entries.write().expect("cache lock poisoned").remove(id);
    }

    /// All entries whose cached value is present (excludes tombstones),
    /// for building `get_all`/`watch_all` results from cache.
    pub fn present_values(&self) -> Vec<T> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .values()
            .filter_map(|entry| entry.value.clone())
            .collect()
    }

    /// Invalidate every entry carrying `tag`, or every entry if `tag` is
    /// `None`. Returns the count invalidated.
    pub fn invalidate_all(&self, tag: Option<&str>) -> u64 {
        let mut guard = self.entries.write().expect("cache lock poisoned");
        match tag {
            None => {
                let count = guard.len() as u64;
                guard.clear();
                count
            }
            Some(tag) => {
                let matching: Vec<T::Id> = guard
                    .iter()
                    .filter(|(_, entry)| entry.tags.contains(tag))
                    .map(|(id, _)| id.clone())
                    .collect();
                let count = matching.len() as u64;
                for id in matching {
                    guard.remove(&id);
                }
                count
            }
        }
    }

    pub fn is_stale(&self, id: &T::Id, now: DateTime<Utc>) -> bool {
        self.get(id).map(|e| e.is_stale(now)).unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
