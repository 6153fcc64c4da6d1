//! Policy enums selecting the algorithm the policy engine runs for a given
//! read or write. See `ripple-storage` for the engine that interprets them.

use serde::{Deserialize, Serialize};

/// Read-path policy. Determines the ordering of cache vs. remote effects
/// and whether a single call may yield one or two observable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchPolicy {
    /// Cache hit and fresh → return cache. Otherwise fetch remote, cache it, return it.
    CacheFirst,
    /// Fetch remote first; on network failure fall back to cache if present.
    NetworkFirst,
    /// Return cache synchronously (if present) while revalidating remote in the background.
    CacheAndNetwork,
    /// Return cache or `null`; never touch remote.
    CacheOnly,
    /// Bypass cache on read; still update cache on success.
    NetworkOnly,
    /// `cacheAndNetwork` when cache exists; `networkFirst` when it doesn't.
    StaleWhileRevalidate,
}

/// Write-path policy. Determines ordering of cache/remote effects and
/// optimistic-rollback behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WritePolicy {
    /// Optimistic: cache → enqueue pending change → attempt remote, with
    /// rollback to `snapshot_before` on non-retryable remote failure.
    CacheAndNetwork,
    /// Remote → cache; caller observes network latency, no optimistic update.
    NetworkFirst,
    /// Cache → pending change → background sync; caller sees success as
    /// soon as the cache commits (offline-first).
    CacheFirst,
    /// Cache only; no pending change, no sync load.
    CacheOnly,
}

/// How a remote write conflict is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    ServerWins,
    ClientWins,
    /// Resolve by comparing timestamps; the later write wins.
    LatestWins,
    /// Resolve with a user-supplied merge function (external to this enum;
    /// selecting this variant routes conflicts to the configured callback).
    Merge,
    /// Delegate resolution to a CRDT-aware backend.
    Crdt,
    /// Resolve with an arbitrary user callback.
    Custom,
}

/// How the sync loop is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Realtime,
    Periodic,
    Manual,
    EventDriven,
    Disabled,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy::CacheFirst
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        WritePolicy::CacheAndNetwork
    }
}

impl Default for ConflictResolution {
    fn default() -> Self {
        ConflictResolution::ServerWins
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Realtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        assert_eq!(FetchPolicy::default(), FetchPolicy::CacheFirst);
        assert_eq!(WritePolicy::default(), WritePolicy::CacheAndNetwork);
        assert_eq!(ConflictResolution::default(), ConflictResolution::ServerWins);
        assert_eq!(SyncMode::default(), SyncMode::Realtime);
    }
}
