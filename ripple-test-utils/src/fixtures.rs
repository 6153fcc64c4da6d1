//! Pre-built fixtures for common test scenarios: one function per canned
//! scenario. `Record` is the demo entity most ripple crates' integration
//! tests reach for when they don't need a domain-specific one.

use ripple_core::{Entity, StoreConfig, SyncMode};

/// A minimal demo entity: an id, a status string used by query filters in
/// tests, and a priority used by order-by clauses.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub id: u64,
    pub status: String,
    pub priority: i64,
}

impl Entity for Record {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }

    fn type_name() -> &'static str {
        "record"
    }
}

/// A `Record` with `status: "active"`.
pub fn active_record(id: u64) -> Record {
    Record {
        id,
        status: "active".into(),
        priority: 0,
    }
}

/// A `Record` with `status: "archived"`.
pub fn archived_record(id: u64) -> Record {
    Record {
        id,
        status: "archived".into(),
        priority: 0,
    }
}

/// A batch of `count` active records with ids `1..=count`, priorities
/// ascending, for tests exercising ordering/pagination.
pub fn record_batch(count: u64) -> Vec<Record> {
    (1..=count)
        .map(|id| Record {
            id,
            status: "active".into(),
            priority: id as i64,
        })
        .collect()
}

/// A `StoreConfig` with `sync_mode` forced to `Manual`, so constructing a
/// store in a test never spawns a background sync loop.
pub fn manual_sync_config() -> StoreConfig {
    StoreConfig {
        sync_mode: SyncMode::Manual,
        ..StoreConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_batch_has_ascending_priority() {
        let records = record_batch(3);
        assert_eq!(records.iter().map(|r| r.priority).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn manual_sync_config_never_syncs_in_background() {
        assert_eq!(manual_sync_config().sync_mode, SyncMode::Manual);
    }
}
