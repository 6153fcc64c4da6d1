//! The sync state machine's state type, shared by the backend interface
//! (`sync_status()`) and the sync engine that drives transitions.

use serde::{Deserialize, Serialize};

/// A state in the per-store sync state machine.
///
/// Transitions are driven by the sync engine; this type only models the
/// states and the question of which transitions are legal, so a
/// misbehaving driver fails loudly instead of corrupting observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending,
    Syncing,
    Error,
    Paused,
    Conflict,
}

impl SyncStatus {
    /// Whether `self -> next` is a legal transition per the state machine:
    /// `synced -> pending -> syncing -> {synced, error, conflict}`, and
    /// `paused` is reachable from and returns to any state.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        match (self, next) {
            (_, Paused) => true,
            (Paused, _) => true,
            (Synced, Pending) => true,
            (Pending, Syncing) => true,
            (Syncing, Synced) => true,
            (Syncing, Error) => true,
            (Syncing, Conflict) => true,
            (Error, Pending) => true,
            (Conflict, Pending) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Synced
    }
}
