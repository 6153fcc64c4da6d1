//! ripple-sync - The sync state machine: drains pending changes against a
//! backend with jittered exponential backoff.

pub mod engine;

pub use engine::SyncEngine;
