use std::cmp::Ordering;

use serde_json::Value;

use crate::firestore::document::FirestoreDocument;
use crate::firestore::model::value_for_field_path;
use crate::firestore::query::{FieldFilter, FilterOperator, OrderBy, OrderDirection, Query};

/// Applies filters, ordering and limit of `query` to candidate documents of
/// its collection, the way the store would.
///
/// Documents lacking a filtered or ordered field are excluded. Ties keep the
/// input order, so callers pass documents sorted by id.
pub(crate) fn apply_query_to_documents(
    documents: Vec<FirestoreDocument>,
    query: &Query,
) -> Vec<FirestoreDocument> {
    let mut filtered: Vec<FirestoreDocument> = documents
        .into_iter()
        .filter(|document| document_satisfies_filters(document, query.filters()))
        .filter(|document| {
            query
                .order_by_clauses()
                .iter()
                .all(|order| field_value(document, order).is_some())
        })
        .collect();

    filtered.sort_by(|left, right| compare_documents(left, right, query.order_by_clauses()));

    if let Some(limit) = query.limit_value() {
        filtered.truncate(limit as usize);
    }

    filtered
}

fn document_satisfies_filters(document: &FirestoreDocument, filters: &[FieldFilter]) -> bool {
    filters.iter().all(|filter| {
        let value = document
            .data()
            .and_then(|fields| value_for_field_path(fields, filter.field()));
        match value {
            Some(value) => evaluate_filter(filter, value),
            None => false,
        }
    })
}

fn evaluate_filter(filter: &FieldFilter, value: &Value) -> bool {
    let operand = filter.value();
    match filter.operator() {
        FilterOperator::Equal => values_equal(value, operand),
        FilterOperator::NotEqual => !values_equal(value, operand),
        FilterOperator::LessThan => compare_values(value, operand) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::GreaterThan => compare_values(value, operand) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::ArrayContains => match value {
            Value::Array(items) => items.iter().any(|item| values_equal(item, operand)),
            _ => false,
        },
        FilterOperator::ArrayContainsAny => match (value, operand) {
            (Value::Array(items), Value::Array(needles)) => needles
                .iter()
                .any(|needle| items.iter().any(|item| values_equal(item, needle))),
            _ => false,
        },
        FilterOperator::In => match operand {
            Value::Array(candidates) => candidates
                .iter()
                .any(|candidate| values_equal(candidate, value)),
            _ => false,
        },
        FilterOperator::NotIn => match operand {
            Value::Array(candidates) => {
                !value.is_null()
                    && candidates
                        .iter()
                        .all(|candidate| !values_equal(candidate, value))
            }
            _ => false,
        },
    }
}

fn field_value<'a>(document: &'a FirestoreDocument, order: &OrderBy) -> Option<&'a Value> {
    value_for_field_path(document.data()?, order.field())
}

fn compare_documents(
    left: &FirestoreDocument,
    right: &FirestoreDocument,
    order_by: &[OrderBy],
) -> Ordering {
    for order in order_by {
        let mut ordering = match (field_value(left, order), field_value(right, order)) {
            (Some(a), Some(b)) => total_order(a, b),
            _ => Ordering::Equal,
        };
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Some(Ordering::Equal)
}

/// Orders values of the same kind; `None` across kinds. Integers and doubles
/// compare numerically.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            Some(total_order(left, right))
        }
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting: kind first, then value.
fn total_order(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| total_order(x, y))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => {
            let mut left_entries: Vec<_> = a.iter().collect();
            let mut right_entries: Vec<_> = b.iter().collect();
            left_entries.sort_by(|x, y| x.0.cmp(y.0));
            right_entries.sort_by(|x, y| x.0.cmp(y.0));
            left_entries
                .iter()
                .zip(right_entries.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| total_order(va, vb)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| left_entries.len().cmp(&right_entries.len()))
        }
        _ => compare_values(left, right)
            .unwrap_or_else(|| type_rank(left).cmp(&type_rank(right))),
    }
}
