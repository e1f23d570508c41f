use crate::value::Value;
use std::cmp::Ordering;

/// Strict comparator for orderable values of the same family.
///
/// Text compared against a number is read as a number when it parses as one,
/// mirroring how a literal in a query string compares against a typed column.
/// Returns `None` for mismatched or non-orderable families.
#[must_use]
pub fn strict_order_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Text(a), b) if is_numeric(b) => numeric_cmp(&numeric_text(a)?, b),
        (a, Value::Text(b)) if is_numeric(a) => numeric_cmp(a, &numeric_text(b)?),
        (a, b) => numeric_cmp(a, b),
    }
}

/// Equality across the literal domain.
///
/// Numbers compare numerically, text against numbers is coerced like
/// [`strict_order_cmp`], lists compare element-wise, objects structurally.
#[must_use]
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| loose_eq(a, b))
        }
        (Value::Object(a), Value::Object(b)) => a == b,
        (a, b) if is_numeric(a) || is_numeric(b) => {
            strict_order_cmp(a, b) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

/// Total comparator used when sorting cached rows.
///
/// Missing and null values are handled by the caller; incomparable pairs
/// are treated as equal so stable sorts keep their relative order.
#[must_use]
pub fn sort_cmp(left: &Value, right: &Value) -> Ordering {
    strict_order_cmp(left, right).unwrap_or(Ordering::Equal)
}

const fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Integer(_) | Value::Number(_))
}

// Integers parse exactly; anything else numeric goes through f64.
fn numeric_text(text: &str) -> Option<Value> {
    let text = text.trim();
    match text.parse::<i128>() {
        Ok(i) => Some(Value::Integer(i)),
        Err(_) => text.parse::<f64>().ok().map(Value::Number),
    }
}

fn numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Number(b)) => integer_float_cmp(*a, *b),
        (Value::Number(a), Value::Integer(b)) => integer_float_cmp(*b, *a).map(Ordering::reverse),
        _ => None,
    }
}

// Integral floats are compared in the integer domain so large ids stay exact.
#[expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integer_float_cmp(int: i128, float: f64) -> Option<Ordering> {
    if float.is_finite() && float.fract() == 0.0 {
        Some(int.cmp(&(float as i128)))
    } else {
        (int as f64).partial_cmp(&float)
    }
}
