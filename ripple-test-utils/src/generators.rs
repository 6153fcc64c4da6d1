//! Proptest strategies for the backend-agnostic types every ripple crate
//! shares: one `arb_<type>` function per type, `prop_oneof!` for enums, a
//! tuple strategy plus `prop_map` for structs.

use std::time::Duration;

use proptest::prelude::*;
use ripple_core::{ConflictResolution, Filter, FilterOperator, OrderBy, Query, RetryConfig, SortDirection, SyncMode};

/// Generate a `FilterOperator` variant.
pub fn arb_filter_operator() -> impl Strategy<Value = FilterOperator> {
    prop_oneof![
        Just(FilterOperator::Eq),
        Just(FilterOperator::Neq),
        Just(FilterOperator::Lt),
        Just(FilterOperator::Lte),
        Just(FilterOperator::Gt),
        Just(FilterOperator::Gte),
        Just(FilterOperator::In),
        Just(FilterOperator::NotIn),
        Just(FilterOperator::Contains),
        Just(FilterOperator::ContainsAny),
        Just(FilterOperator::StartsWith),
        Just(FilterOperator::EndsWith),
        Just(FilterOperator::IsNull),
        Just(FilterOperator::IsNotNull),
    ]
}

/// Generate a JSON scalar suitable as a `Filter`'s comparison value.
pub fn arb_json_scalar() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<bool>().prop_map(serde_json::Value::from),
        (-1000i64..1000).prop_map(serde_json::Value::from),
        "[a-zA-Z0-9_]{0,16}".prop_map(serde_json::Value::from),
    ]
}

/// Generate a `Filter` over a small fixed field vocabulary (field names
/// don't matter to the filter logic, only that two filters can agree on one).
pub fn arb_filter() -> impl Strategy<Value = Filter> {
    (prop_oneof![Just("status"), Just("name"), Just("priority")], arb_filter_operator(), arb_json_scalar()).prop_map(
        |(field, operator, value)| {
            if matches!(operator, FilterOperator::IsNull | FilterOperator::IsNotNull) {
                match operator {
                    FilterOperator::IsNull => Filter::is_null(field),
                    _ => Filter::is_not_null(field),
                }
            } else {
                Filter::new(field, operator, value)
            }
        },
    )
}

/// Generate a `SortDirection` variant.
pub fn arb_sort_direction() -> impl Strategy<Value = SortDirection> {
    prop_oneof![Just(SortDirection::Ascending), Just(SortDirection::Descending)]
}

/// Generate an `OrderBy` clause.
pub fn arb_order_by() -> impl Strategy<Value = OrderBy> {
    (prop_oneof![Just("status"), Just("name"), Just("priority")], arb_sort_direction())
        .prop_map(|(field, direction)| OrderBy { field: field.to_string(), direction })
}

/// Generate an arbitrary `Query` with 0-3 filters, 0-2 order-by clauses,
/// and an optional limit/offset.
pub fn arb_query() -> impl Strategy<Value = Query> {
    (
        prop::collection::vec(arb_filter(), 0..3),
        prop::collection::vec(arb_order_by(), 0..2),
        prop::option::of(1usize..50),
        prop::option::of(0usize..20),
    )
        .prop_map(|(filters, order_bys, limit, offset)| {
            let mut query = Query::new();
            for filter in filters {
                query = query.filter(filter);
            }
            for order_by in order_bys {
                query = query.order_by(order_by);
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            if let Some(offset) = offset {
                query = query.offset(offset);
            }
            query
        })
}

/// Generate a `ConflictResolution` variant.
pub fn arb_conflict_resolution() -> impl Strategy<Value = ConflictResolution> {
    prop_oneof![
        Just(ConflictResolution::ServerWins),
        Just(ConflictResolution::ClientWins),
        Just(ConflictResolution::LatestWins),
        Just(ConflictResolution::Merge),
        Just(ConflictResolution::Crdt),
        Just(ConflictResolution::Custom),
    ]
}

/// Generate a `SyncMode` variant.
pub fn arb_sync_mode() -> impl Strategy<Value = SyncMode> {
    prop_oneof![
        Just(SyncMode::Realtime),
        Just(SyncMode::Periodic),
        Just(SyncMode::Manual),
        Just(SyncMode::EventDriven),
        Just(SyncMode::Disabled),
    ]
}

/// Generate a valid `RetryConfig` (passes `RetryConfig::validate`).
pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
    (1u64..500, 500u64..60_000, 1.1f64..4.0, 0.0f64..1.0).prop_map(|(initial_ms, max_ms, multiplier, jitter)| {
        RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(initial_ms),
            max_backoff: Duration::from_millis(max_ms.max(initial_ms)),
            backoff_multiplier: multiplier,
            jitter_factor: jitter,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn generated_retry_configs_are_always_valid(config in arb_retry_config()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn generated_queries_round_trip_through_json(query in arb_query()) {
            let json = serde_json::to_value(&query).unwrap();
            let back: Query = serde_json::from_value(json).unwrap();
            prop_assert_eq!(query, back);
        }
    }
}
