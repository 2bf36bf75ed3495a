//! In-memory query evaluation: filter, sort, paginate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::comparison::{ordered_compare, sort_compare};

/// A filter specification: field name to literal (equality) or operator map.
pub type Filter = serde_json::Map<String, Value>;

/// Sort, skip and limit options for a query.
///
/// Sort pairs are evaluated lexicographically (the first field is the
/// primary key); direction `1` is ascending, any other value descending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Ordered `(field, direction)` pairs.
    pub sort:  Vec<(String, i64)>,
    /// Number of documents to skip from the front of the result.
    pub skip:  Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

/// Checks whether a document matches every condition in a filter.
///
/// Conditions are conjunctive across fields and across operators on one
/// field. An empty filter matches everything. Unrecognized operators are
/// ignored rather than excluding the document: queries written against a
/// newer operator set degrade to broader results instead of crashing.
pub fn matches_filter(doc: &Value, filter: &Filter) -> bool {
    filter.iter().all(|(field, condition)| {
        let field_value = doc.get(field);
        match condition {
            Value::Object(operators) => operators
                .iter()
                .all(|(op, operand)| matches_operator(field_value, op, operand)),
            literal => field_value == Some(literal),
        }
    })
}

fn matches_operator(field_value: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$gt" => ordered(field_value, operand, |o| o.is_gt()),
        "$gte" => ordered(field_value, operand, |o| o.is_ge()),
        "$lt" => ordered(field_value, operand, |o| o.is_lt()),
        "$lte" => ordered(field_value, operand, |o| o.is_le()),
        "$ne" => field_value != Some(operand),
        "$in" => match (operand.as_array(), field_value) {
            (Some(list), Some(value)) => list.contains(value),
            // non-list operand (or missing field) excludes the document
            _ => false,
        },
        "$nin" => match operand.as_array() {
            Some(list) => field_value.is_none_or(|value| !list.contains(value)),
            None => false,
        },
        // unknown operator: fail open, keep the document
        _ => true,
    }
}

fn ordered(
    field_value: Option<&Value>,
    operand: &Value,
    check: fn(std::cmp::Ordering) -> bool,
) -> bool {
    field_value
        .and_then(|value| ordered_compare(value, operand))
        .is_some_and(check)
}

/// Retains the documents matching a filter, preserving input order.
pub fn apply_filter(docs: Vec<Value>, filter: &Filter) -> Vec<Value> {
    if filter.is_empty() {
        return docs;
    }
    docs.into_iter()
        .filter(|doc| matches_filter(doc, filter))
        .collect()
}

/// Stable sort over an ordered list of `(field, direction)` keys.
///
/// Missing fields compare equal on their key; ties across all keys keep
/// their input order.
pub fn apply_sort(docs: &mut [Value], sort: &[(String, i64)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let ordering = sort_compare(a.get(field), b.get(field));
            let ordering = if *direction == 1 { ordering } else { ordering.reverse() };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Returns `docs[skip .. skip + limit]` with clamped bounds.
pub fn paginate(docs: Vec<Value>, skip: Option<usize>, limit: Option<usize>) -> Vec<Value> {
    docs.into_iter()
        .skip(skip.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
