//! ripple-reactive - Replay channels and the per-id/per-query reactive
//! fan-out index that sits beside the cache.

pub mod channel;
pub mod index;
pub mod query_eval;

pub use channel::ReplayChannel;
pub use index::ReactiveIndex;
