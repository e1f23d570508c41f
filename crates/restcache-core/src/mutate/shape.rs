use crate::value::Row;
use serde_json::{Value as JsonValue, json};
use thiserror::Error as ThisError;

/// Keys a `{ data, count }` response may carry besides `data`.
const PAGINATED_KEYS: [&str; 5] = ["data", "count", "error", "status", "statusText"];

///
/// CachedValue
///
/// Closed set of shapes a cached query result takes.
///

#[derive(Clone, Debug, PartialEq)]
pub enum CachedValue {
    /// `.single()` / `.maybeSingle()` responses.
    Row(Option<Row>),
    Rows(Vec<Row>),
    /// Responses that carry an exact, planned, or estimated count.
    Paginated {
        data: Vec<Row>,
        count: Option<u64>,
    },
    /// Infinite and paged lists, one vector per page.
    Pages(Vec<Vec<Row>>),
}

impl CachedValue {
    /// Total number of rows across every shape.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Row(row) => usize::from(row.is_some()),
            Self::Rows(rows) | Self::Paginated { data: rows, .. } => rows.len(),
            Self::Pages(pages) => pages.iter().map(Vec::len).sum(),
        }
    }
}

///
/// ShapeError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ShapeError {
    #[error("expected an object, an array, or null; found {found}")]
    UnexpectedValue { found: &'static str },

    #[error("list element {index} is not an object")]
    NotARow { index: usize },

    #[error("pages must all be arrays")]
    MixedPages,
}

impl TryFrom<JsonValue> for CachedValue {
    type Error = ShapeError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Null => Ok(Self::Row(None)),
            JsonValue::Object(mut map) => {
                let is_paginated = map.get("data").is_some_and(JsonValue::is_array)
                    && map.keys().all(|k| PAGINATED_KEYS.contains(&k.as_str()));
                if !is_paginated {
                    return Ok(Self::Row(Some(map)));
                }

                let count = map.get("count").and_then(JsonValue::as_u64);
                let data = match map.remove("data") {
                    Some(JsonValue::Array(items)) => rows(items)?,
                    _ => Vec::new(),
                };

                Ok(Self::Paginated { data, count })
            }
            JsonValue::Array(items) => {
                if !items.is_empty() && items.iter().all(JsonValue::is_array) {
                    let pages = items
                        .into_iter()
                        .map(|page| match page {
                            JsonValue::Array(page) => rows(page),
                            _ => Err(ShapeError::MixedPages),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Self::Pages(pages));
                }
                if items.iter().any(JsonValue::is_array) {
                    return Err(ShapeError::MixedPages);
                }

                rows(items).map(Self::Rows)
            }
            other => Err(ShapeError::UnexpectedValue {
                found: json_kind(&other),
            }),
        }
    }
}

impl From<CachedValue> for JsonValue {
    fn from(value: CachedValue) -> Self {
        match value {
            CachedValue::Row(None) => Self::Null,
            CachedValue::Row(Some(row)) => Self::Object(row),
            CachedValue::Rows(rows) => rows_to_json(rows),
            CachedValue::Paginated { data, count } => json!({
                "data": rows_to_json(data),
                "count": count,
            }),
            CachedValue::Pages(pages) => Self::Array(pages.into_iter().map(rows_to_json).collect()),
        }
    }
}

fn rows(items: Vec<JsonValue>) -> Result<Vec<Row>, ShapeError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            JsonValue::Object(row) => Ok(row),
            _ => Err(ShapeError::NotARow { index }),
        })
        .collect()
}

fn rows_to_json(rows: Vec<Row>) -> JsonValue {
    JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect())
}

const fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
