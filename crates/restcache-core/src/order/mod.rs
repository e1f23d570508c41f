//! PostgREST `order` parameter parsing and row ordering.


use crate::value::{Row, Value, lookup, sort_cmp};
use derive_more::{Deref, IntoIterator};
use std::cmp::Ordering;
use thiserror::Error as ThisError;

///
/// OrderParseError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum OrderParseError {
    #[error("malformed order spec '{spec}': {reason}")]
    MalformedOrderSpec { spec: String, reason: String },
}

impl OrderParseError {
    fn malformed(spec: &str, reason: impl Into<String>) -> Self {
        Self::MalformedOrderSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

///
/// OrderKey
///
/// One sort column. `nulls_first` places null and missing values ahead of
/// every present value regardless of direction.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderKey {
    pub column: String,
    pub ascending: bool,
    pub nulls_first: bool,
}

///
/// OrderSpec
///

#[derive(Clone, Debug, Default, Deref, Eq, IntoIterator, PartialEq)]
#[into_iterator(owned, ref)]
pub struct OrderSpec(Vec<OrderKey>);

impl OrderSpec {
    #[must_use]
    pub const fn new(keys: Vec<OrderKey>) -> Self {
        Self(keys)
    }

    /// Compare two rows, returning the first non-equal key ordering.
    #[must_use]
    pub fn compare(&self, left: &Row, right: &Row) -> Ordering {
        for key in &self.0 {
            let ordering = compare_key_pair(left, right, key);

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }

    /// Index at which `row` keeps `rows` sorted, placed after any rows that
    /// compare equal to it.
    #[must_use]
    pub fn insertion_index(&self, rows: &[Row], row: &Row) -> usize {
        rows.partition_point(|existing| self.compare(existing, row) != Ordering::Greater)
    }
}

///
/// OrderSlot
///

enum OrderSlot {
    Missing,
    Present(Value),
}

fn order_slot(row: &Row, column: &str) -> OrderSlot {
    match lookup(row, column) {
        Some(value) if !value.is_null() => OrderSlot::Present(Value::from_json(value)),
        _ => OrderSlot::Missing,
    }
}

// Compare one configured key across two rows.
fn compare_key_pair(left: &Row, right: &Row, key: &OrderKey) -> Ordering {
    let nulls = if key.nulls_first {
        Ordering::Less
    } else {
        Ordering::Greater
    };

    match (order_slot(left, &key.column), order_slot(right, &key.column)) {
        (OrderSlot::Missing, OrderSlot::Missing) => Ordering::Equal,
        (OrderSlot::Missing, OrderSlot::Present(_)) => nulls,
        (OrderSlot::Present(_), OrderSlot::Missing) => nulls.reverse(),
        (OrderSlot::Present(a), OrderSlot::Present(b)) => {
            let ordering = sort_cmp(&a, &b);
            if key.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        }
    }
}

///
/// Parsing
///

/// Parse a comma-separated `column[.asc|desc][.nullsfirst|nullslast]` list.
///
/// Direction defaults to ascending; nulls default to last for ascending and
/// first for descending keys. Foreign-table keys written `rel(col)` address
/// the nested path `rel.col`.
pub fn parse_order_by_key(spec: &str) -> Result<OrderSpec, OrderParseError> {
    spec.split(',')
        .map(|part| parse_order_key(spec, part.trim()))
        .collect::<Result<Vec<_>, _>>()
        .map(OrderSpec)
}

fn parse_order_key(spec: &str, part: &str) -> Result<OrderKey, OrderParseError> {
    // foreign-table columns may themselves contain dots only inside parens
    let (column, modifiers) = match part.find(')') {
        Some(close) => {
            let (head, tail) = part.split_at(close + 1);
            (head, tail.strip_prefix('.').unwrap_or(tail))
        }
        None => part.split_once('.').unwrap_or((part, "")),
    };

    let column = normalize_column(spec, column)?;

    let mut ascending = None;
    let mut nulls_first = None;
    for token in modifiers.split('.').filter(|t| !t.is_empty()) {
        match token {
            "asc" | "desc" if ascending.is_none() && nulls_first.is_none() => {
                ascending = Some(token == "asc");
            }
            "nullsfirst" | "nullslast" if nulls_first.is_none() => {
                nulls_first = Some(token == "nullsfirst");
            }
            "asc" | "desc" | "nullsfirst" | "nullslast" => {
                return Err(OrderParseError::malformed(
                    spec,
                    format!("unexpected '{token}' in '{part}'"),
                ));
            }
            other => {
                return Err(OrderParseError::malformed(
                    spec,
                    format!("unknown order token '{other}' in '{part}'"),
                ));
            }
        }
    }

    let ascending = ascending.unwrap_or(true);

    Ok(OrderKey {
        column,
        ascending,
        nulls_first: nulls_first.unwrap_or(!ascending),
    })
}

// `rel(col)` becomes `rel.col`.
fn normalize_column(spec: &str, column: &str) -> Result<String, OrderParseError> {
    let column = column.trim();
    if column.is_empty() {
        return Err(OrderParseError::malformed(spec, "empty column"));
    }

    match column.split_once('(') {
        Some((rel, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .filter(|inner| !inner.is_empty() && !rel.is_empty())
                .ok_or_else(|| {
                    OrderParseError::malformed(spec, format!("bad foreign column '{column}'"))
                })?;
            Ok(format!("{rel}.{inner}"))
        }
        None => Ok(column.to_string()),
    }
}
