//! Identifier contract for entity identifiers.
//!
//! The engine is generic over an identifier type `ID` supplied by the caller
//! for each entity type `T`. Unlike a concrete ID scheme (UUID, integer,
//! composite key), the engine only needs enough structure to key caches,
//! reactive channels, and pending-change queues.

use std::fmt::Debug;
use std::hash::Hash;

/// Marker trait for values usable as an entity identifier.
///
/// Blanket-implemented for any type with the required bounds, so callers
/// can use `Uuid`, `String`, `i64`, or their own newtype without writing an
/// impl. The `Ord` bound lets list results fall back to a stable,
/// deterministic order-by-id when a query has no (or tied) order-by clauses.
pub trait Identifier: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> Identifier for T where T: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn assert_identifier<T: Identifier>() {}

    #[test]
    fn common_id_types_qualify() {
        assert_identifier::<Uuid>();
        assert_identifier::<String>();
        assert_identifier::<i64>();
        assert_identifier::<u64>();
    }
}
