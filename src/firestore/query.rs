use serde_json::Value;

use crate::firestore::error::{invalid_argument, FirestoreAdapterError, FirestoreResult};
use crate::firestore::model::{CollectionPath, FieldPath};

/// Caller-supplied refinement of a collection query, applied once when the
/// query is built.
pub type QueryModifier = Box<dyn FnOnce(Query) -> Query + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    /// Operator name used by the REST `structuredQuery`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "EQUAL",
            FilterOperator::NotEqual => "NOT_EQUAL",
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::ArrayContains => "ARRAY_CONTAINS",
            FilterOperator::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
        }
    }

    fn takes_array(&self) -> bool {
        matches!(
            self,
            FilterOperator::ArrayContainsAny | FilterOperator::In | FilterOperator::NotIn
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASCENDING",
            OrderDirection::Descending => "DESCENDING",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: FieldPath,
    operator: FilterOperator,
    value: Value,
}

impl FieldFilter {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// Query over one collection: filters, ordering and a limit.
///
/// Builder methods never fail; the first invalid clause is remembered and
/// reported when the query runs.
#[derive(Clone, Debug)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: Option<u32>,
    error: Option<FirestoreAdapterError>,
}

impl Query {
    pub(crate) fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            error: None,
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Keeps documents whose `field` (dot-separated) satisfies `operator`
    /// against `value`. Filters combine with AND.
    pub fn where_field(
        mut self,
        field: &str,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        let value = value.into();
        if operator.takes_array() && !value.as_array().is_some_and(|items| !items.is_empty()) {
            self.record(invalid_argument(format!(
                "Filter '{}' on '{field}' requires a non-empty array",
                operator.as_str()
            )));
            return self;
        }
        match FieldPath::from_dot_separated(field) {
            Ok(field) => self.filters.push(FieldFilter {
                field,
                operator,
                value,
            }),
            Err(err) => self.record(err),
        }
        self
    }

    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Self {
        match FieldPath::from_dot_separated(field) {
            Ok(field) => self.order_by.push(OrderBy { field, direction }),
            Err(err) => self.record(err),
        }
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        if limit == 0 {
            self.record(invalid_argument("Query limit must be positive"));
        } else {
            self.limit = Some(limit);
        }
        self
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn order_by_clauses(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub(crate) fn validate(&self) -> FirestoreResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn record(&mut self, error: FirestoreAdapterError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Query {
        Query::new(CollectionPath::parse("users").unwrap())
    }

    #[test]
    fn builds_clauses_in_order() {
        let query = users()
            .where_field("age", FilterOperator::GreaterThanOrEqual, 18)
            .where_field("tags", FilterOperator::ArrayContains, "admin")
            .order_by("age", OrderDirection::Descending)
            .limit(10);
        assert!(query.validate().is_ok());
        assert_eq!(query.filters().len(), 2);
        assert_eq!(query.filters()[0].value(), &json!(18));
        assert_eq!(query.order_by_clauses()[0].direction().as_str(), "DESCENDING");
        assert_eq!(query.limit_value(), Some(10));
    }

    #[test]
    fn first_invalid_clause_is_reported() {
        let query = users()
            .where_field("", FilterOperator::Equal, 1)
            .where_field("role", FilterOperator::In, json!([]))
            .limit(0);
        let err = query.validate().unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
        assert!(err.message().contains("empty"));

        let query = users().where_field("role", FilterOperator::NotIn, "admin");
        assert!(query.validate().is_err());
    }
}
