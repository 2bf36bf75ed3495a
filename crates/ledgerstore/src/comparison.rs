//! Comparison utilities for filter operators and sort ordering.

use std::cmp::Ordering;

use serde_json::Value;

/// Compares two JSON values for ordered filter operators (`$gt`, `$lt`, ...).
///
/// Only numbers (compared as `f64`) and strings (lexicographic) are
/// comparable; any other pairing, including cross-type pairings, returns
/// `None` and the operator evaluates false for that document.
pub fn ordered_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => na.as_f64()?.partial_cmp(&nb.as_f64()?),
        (Value::String(sa), Value::String(sb)) => Some(sa.cmp(sb)),
        _ => None,
    }
}

/// Compares two optional JSON values for sorting purposes.
///
/// A missing field compares equal on its key, so documents without the sort
/// field keep their stable input position. Present values use a total order
/// ranking null < bool < number < string < array < object across types.
pub fn sort_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(va), Some(vb)) => compare_json_values(va, vb),
        _ => Ordering::Equal,
    }
}

fn compare_json_values(a: &Value, b: &Value) -> Ordering {
    fn type_order(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    let type_a = type_order(a);
    let type_b = type_order(b);

    if type_a != type_b {
        return type_a.cmp(&type_b);
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(0.0);
            let fb = nb.as_f64().unwrap_or(0.0);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        },
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Array(aa), Value::Array(ab)) => aa.len().cmp(&ab.len()),
        (Value::Object(oa), Value::Object(ob)) => oa.len().cmp(&ob.len()),
        _ => unreachable!(),
    }
}
