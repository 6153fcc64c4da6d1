//! Generic evaluation of a `Query` against entities serialized to JSON.
//!
//! The store is generic over the entity type `T`, so query filtering can't
//! be specialized per field; instead each entity is serialized (it already
//! implements `Serialize` per `Entity`) and filters are evaluated against
//! the resulting JSON object's top-level fields.

use ripple_core::{Filter, FilterOperator, OrderBy, Query, SortDirection};
use serde_json::Value;

fn field_value<'a>(entity: &'a Value, field: &str) -> Option<&'a Value> {
    entity.get(field)
}

fn matches_filter(entity: &Value, filter: &Filter) -> bool {
    let actual = field_value(entity, &filter.field);
    match filter.operator {
        FilterOperator::IsNull => actual.map(Value::is_null).unwrap_or(true),
        FilterOperator::IsNotNull => actual.map(|v| !v.is_null()).unwrap_or(false),
        _ => {
            let (Some(actual), Some(expected)) = (actual, filter.value.as_ref()) else {
                return false;
            };
            match filter.operator {
                FilterOperator::Eq => actual == expected,
                FilterOperator::Neq => actual != expected,
                FilterOperator::Lt => compare(actual, expected) == Some(std::cmp::Ordering::Less),
                FilterOperator::Lte => {
                    matches!(
                        compare(actual, expected),
                        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                    )
                }
                FilterOperator::Gt => {
                    compare(actual, expected) == Some(std::cmp::Ordering::Greater)
                }
                FilterOperator::Gte => {
                    matches!(
                        compare(actual, expected),
                        Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                    )
                }
                FilterOperator::In => expected.as_array().map(|arr| arr.contains(actual)).unwrap_or(false),
                FilterOperator::NotIn => {
                    !expected.as_array().map(|arr| arr.contains(actual)).unwrap_or(false)
                }
                FilterOperator::Contains => contains(actual, expected),
                FilterOperator::ContainsAny => expected
                    .as_array()
                    .map(|arr| arr.iter().any(|v| contains(actual, v)))
                    .unwrap_or(false),
                FilterOperator::StartsWith => str_pred(actual, expected, str::starts_with),
                FilterOperator::EndsWith => str_pred(actual, expected, str::ends_with),
                FilterOperator::IsNull | FilterOperator::IsNotNull => unreachable!(),
            }
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        _ => false,
    }
}

fn str_pred(actual: &Value, expected: &Value, pred: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(b)) => pred(a, b),
        _ => false,
    }
}

/// Whether `entity` (serialized to JSON) satisfies every filter in `query`
/// (filters combine with AND).
pub fn admits(query: &Query, entity: &Value) -> bool {
    query.filters().iter().all(|f| matches_filter(entity, f))
}

/// Apply a query's filters, ordering, and pagination to a JSON-valued
/// view of `items`, returning the indices of `items` that survive in
/// final order.
pub fn select(query: &Query, items: &[Value]) -> Vec<usize> {
    let mut indices: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, v)| admits(query, v))
        .map(|(i, _)| i)
        .collect();

    for clause in query.order_clauses().iter().rev() {
        sort_by_clause(&mut indices, items, clause);
    }

    let offset = query.offset_value().unwrap_or(0);
    let indices: Vec<usize> = indices.into_iter().skip(offset).collect();
    match query.limit_value() {
        Some(limit) => indices.into_iter().take(limit).collect(),
        None => indices,
    }
}

fn sort_by_clause(indices: &mut [usize], items: &[Value], clause: &OrderBy) {
    indices.sort_by(|&a, &b| {
        let va = field_value(&items[a], &clause.field);
        let vb = field_value(&items[b], &clause.field);
        let ord = match (va, vb) {
            (Some(va), Some(vb)) => compare(va, vb).unwrap_or(std::cmp::Ordering::Equal),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        match clause.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}
