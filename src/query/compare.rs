//! Value comparison for `equal` and `sort`

use super::QueryResult;
use crate::storage::Value;
use std::cmp::Ordering;

pub fn results_equal(a: &QueryResult, b: &QueryResult) -> bool {
    match (a, b) {
        (QueryResult::Value(a), QueryResult::Value(b)) => values_equal(a, b),
        (QueryResult::Record(a), QueryResult::Record(b)) => a.model == b.model && a.id == b.id,
        (QueryResult::Records(a), QueryResult::Records(b)) => {
            a.len() == b.len() && a.keys().all(|id| b.contains_key(id))
        }
        (QueryResult::Sequence(a), QueryResult::Sequence(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.model == b.model && a.id == b.id)
        }
        _ => false,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            compare_values(Some(a), Some(b)) == Ordering::Equal
        }
        _ => a == b,
    }
}

/// Total ordering for sort keys.
///
/// Values rank by kind first: missing and null, then booleans, numbers,
/// strings, arrays and objects. Ints and floats compare by numeric value;
/// NaN sorts after every other number.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => return Ordering::Equal,
        (Some(a), Some(b)) => (a, b),
        (a, b) => return rank(a).cmp(&rank(b)),
    };

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => float_key(*a).total_cmp(&float_key(*b)),
        (Value::Int(a), Value::Float(b)) => compare_int_float(*a, *b),
        (Value::Float(a), Value::Int(b)) => compare_int_float(*b, *a).reverse(),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (a, b) in a.iter().zip(b) {
                let cmp = compare_values(Some(a), Some(b));
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => {
            for ((a_key, a), (b_key, b)) in a.iter().zip(b) {
                let cmp = a_key.cmp(b_key).then_with(|| compare_values(Some(a), Some(b)));
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            a.len().cmp(&b.len())
        }
        (a, b) => rank(Some(a)).cmp(&rank(Some(b))),
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Int(_) | Value::Float(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// -0.0 and 0.0 are the same key, as are all NaNs
fn float_key(f: f64) -> f64 {
    if f == 0.0 {
        0.0
    } else if f.is_nan() {
        f64::NAN
    } else {
        f
    }
}

/// Exact comparison, no rounding of `a` through f64
fn compare_int_float(a: i64, b: f64) -> Ordering {
    // 2^63
    const BOUND: f64 = 9_223_372_036_854_775_808.0;

    if b.is_nan() {
        return Ordering::Less;
    }
    if b >= BOUND {
        return Ordering::Less;
    }
    if b < -BOUND {
        return Ordering::Greater;
    }
    let floor = b.floor();
    match a.cmp(&(floor as i64)) {
        Ordering::Equal if floor < b => Ordering::Less,
        other => other,
    }
}
