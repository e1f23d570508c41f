mod compare;
mod parse;


pub use compare::{loose_eq, sort_cmp, strict_order_cmp};
pub use parse::{parse_iso_date_time, parse_value};

use serde_json::Value as JsonValue;
use time::OffsetDateTime;

///
/// Row
///
/// One record as returned by the REST layer: column name to JSON value.
/// Nested objects hold embedded resources.
///

pub type Row = serde_json::Map<String, JsonValue>;

///
/// Value
///
/// Closed literal domain used by filter evaluation and row ordering.
/// Text that is an ISO-8601 date-time is lifted into `Date` so comparisons
/// follow instants rather than string order. Integral JSON numbers stay
/// exact in `Integer`; only fractional or exponent forms become `Number`.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i128),
    Number(f64),
    Text(String),
    Date(OffsetDateTime),
    List(Vec<Self>),
    Object(Row),
}

impl Value {
    /// Lift one JSON value into the literal domain.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i.into())
                } else if let Some(u) = n.as_u64() {
                    Self::Integer(u.into())
                } else {
                    n.as_f64().map_or(Self::Null, Self::Number)
                }
            }
            JsonValue::String(s) => match parse_iso_date_time(s) {
                Some(date) => Self::Date(date),
                None => Self::Text(s.clone()),
            },
            JsonValue::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(map) => Self::Object(map.clone()),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the list payload, if any.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Integer(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

///
/// Path lookup
///

/// Split one column path into segments.
///
/// Dots separate embedded resources; `->` and `->>` JSON operators are
/// treated as further nesting.
pub(crate) fn path_segments(path: &str) -> Vec<&str> {
    path.split('.')
        .flat_map(|part| part.split("->"))
        .map(|seg| seg.strip_prefix('>').unwrap_or(seg))
        .filter(|seg| !seg.is_empty())
        .collect()
}

/// Look up one (possibly nested) path in a row.
#[must_use]
pub fn lookup<'a>(row: &'a Row, path: &str) -> Option<&'a JsonValue> {
    let segments = path_segments(path);
    let (first, rest) = segments.split_first()?;

    let mut current = row.get(*first)?;
    for seg in rest {
        current = current.as_object()?.get(*seg)?;
    }

    Some(current)
}

/// Return true when the row carries a value at `path`.
///
/// Traversal stops successfully at a `null` or array intermediate: an
/// optional embedded resource that is absent, or a one-to-many embedding,
/// still counts as present.
#[must_use]
pub fn has_path(row: &Row, path: &str) -> bool {
    let segments = path_segments(path);
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };

    let Some(mut current) = row.get(*first) else {
        return false;
    };
    for seg in rest {
        match current {
            JsonValue::Object(map) => match map.get(*seg) {
                Some(next) => current = next,
                None => return false,
            },
            JsonValue::Null | JsonValue::Array(_) => return true,
            _ => return false,
        }
    }

    true
}

/// Write `value` at a dotted path, creating intermediate objects.
///
/// A non-object intermediate is replaced by an object.
pub fn set_path(row: &mut Row, path: &str, value: JsonValue) {
    let segments = path_segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = row;
    for seg in parents {
        let slot = current
            .entry((*seg).to_string())
            .or_insert_with(|| JsonValue::Object(Row::new()));
        if !slot.is_object() {
            *slot = JsonValue::Object(Row::new());
        }
        let JsonValue::Object(next) = slot else {
            return;
        };
        current = next;
    }

    current.insert((*last).to_string(), value);
}
