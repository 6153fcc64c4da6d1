//! Backend-agnostic query model.
//!
//! A `Query` bundles filters, ordering, and pagination into an immutable
//! value. Two queries are structurally equal iff they'd select the same
//! rows in the same order — that structural identity is the "query key"
//! the reactive fan-out uses to index per-query live streams.

use serde::{Deserialize, Serialize};

/// A filter operator for a single field comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Contains,
    ContainsAny,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
}

/// A single field/operator/value comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    /// Comparison value; absent for `is_null`/`is_not_null`, which need none.
    pub value: Option<serde_json::Value>,
}

impl Filter {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Some(value),
        }
    }

    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    pub fn neq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Neq, value)
    }

    pub fn contains(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::IsNull,
            value: None,
        }
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::IsNotNull,
            value: None,
        }
    }
}

/// Sort direction for an order-by clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A single order-by clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// An immutable query: an ordered list of filters, an ordered list of
/// order-by clauses, and optional limit/offset. Builder calls return a new
/// value rather than mutating in place.
///
/// `Query` derives structural equality so it can key the query-stream
/// index directly — two queries built from the same clauses in the same
/// order are the same query key; reordering filters changes the key even
/// though it wouldn't change the result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    filters: Vec<FilterRepr>,
    order_by: Vec<OrderByRepr>,
    limit: Option<usize>,
    offset: Option<usize>,
}

// `serde_json::Value` isn't `Eq`/`Hash`; `Query` needs both to serve as a
// hash-map key for the query-stream index, so filters are stored with their
// value pre-serialized to a canonical string rather than as `Filter` directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct FilterRepr {
    field: String,
    operator: FilterOperator,
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct OrderByRepr {
    field: String,
    direction: SortDirection,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new query with `filter` appended.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(FilterRepr {
            field: filter.field,
            operator: filter.operator,
            value: filter.value.map(|v| v.to_string()),
        });
        self
    }

    /// Return a new query with `clause` appended to the order-by list.
    pub fn order_by(mut self, clause: OrderBy) -> Self {
        self.order_by.push(OrderByRepr {
            field: clause.field,
            direction: clause.direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.filters
            .iter()
            .map(|f| Filter {
                field: f.field.clone(),
                operator: f.operator,
                value: f
                    .value
                    .as_ref()
                    .map(|s| serde_json::from_str(s).unwrap_or(serde_json::Value::Null)),
            })
            .collect()
    }

    pub fn order_clauses(&self) -> Vec<OrderBy> {
        self.order_by
            .iter()
            .map(|o| OrderBy {
                field: o.field.clone(),
                direction: o.direction,
            })
            .collect()
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<usize> {
        self.offset
    }

    /// True if this query has no filters, order-by, limit, or offset — the
    /// "select everything, in backend-native order" query.
    pub fn is_unconstrained(&self) -> bool {
        self.filters.is_empty()
            && self.order_by.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_calls_return_new_values() {
        let base = Query::new();
        let with_filter = base.clone().filter(Filter::eq("name", "alice".into()));
        assert!(base.is_unconstrained());
        assert!(!with_filter.is_unconstrained());
    }

    #[test]
    fn structural_equality_is_the_query_key() {
        let q1 = Query::new().filter(Filter::eq("name", "alice".into()));
        let q2 = Query::new().filter(Filter::eq("name", "alice".into()));
        assert_eq!(q1, q2);

        let q3 = Query::new().filter(Filter::eq("name", "bob".into()));
        assert_ne!(q1, q3);
    }

    #[test]
    fn filters_and_order_round_trip() {
        let q = Query::new()
            .filter(Filter::eq("status", "active".into()))
            .order_by(OrderBy::asc("created_at"))
            .limit(10)
            .offset(5);

        assert_eq!(q.filters().len(), 1);
        assert_eq!(q.order_clauses().len(), 1);
        assert_eq!(q.limit_value(), Some(10));
        assert_eq!(q.offset_value(), Some(5));
    }
}
