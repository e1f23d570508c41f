//! Cache key addressing.
//!
//! A key embeds schema, table, a canonical query string, and the pagination
//! and order hints the planner needs. Keys that do not follow this scheme
//! decode to `None` and are skipped, never reported as errors.

mod canonical;


pub use canonical::{canonicalize_query, encode_object, query_param, query_params};

use crate::{KEY_PREFIX, KEY_SEPARATOR, value::Row};
use std::{fmt, num::NonZeroUsize, str::FromStr};

const PAGE_MARKER: &str = "page";
const INFINITE_MARKER: &str = "inf";
const NULL_SEGMENT: &str = "null";
const COUNT_FIELD: &str = "count=";
const HEAD_FIELD: &str = "head=";

///
/// CountMethod
///
/// Row-count strategy requested with the query (`Prefer: count=...`).
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CountMethod {
    Exact,
    Planned,
    Estimated,
}

impl CountMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Planned => "planned",
            Self::Estimated => "estimated",
        }
    }
}

impl fmt::Display for CountMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "planned" => Ok(Self::Planned),
            "estimated" => Ok(Self::Estimated),
            _ => Err(()),
        }
    }
}

///
/// DecodedKey
///
/// Structured view of one cache key. Created fresh per decode call.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DecodedKey {
    pub schema: String,
    pub table: String,
    pub query_key: String,
    pub limit: Option<NonZeroUsize>,
    pub offset: Option<usize>,
    pub order_by_key: Option<String>,
    pub body_key: Option<String>,
    pub count: Option<CountMethod>,
    pub is_head: bool,
    pub is_infinite: bool,
}

///
/// KeyParts
///
/// Inputs of [`encode`]. `query` may be in any parameter order; it is
/// canonicalized before it is embedded. `body` is the request payload of
/// RPC-style queries and is embedded through [`encode_object`].
///

#[derive(Clone, Copy, Debug, Default)]
pub struct KeyParts<'a> {
    pub schema: &'a str,
    pub table: &'a str,
    pub query: &'a str,
    pub body: Option<&'a Row>,
    pub count: Option<CountMethod>,
    pub head: bool,
    pub infinite: bool,
}

impl<'a> KeyParts<'a> {
    #[must_use]
    pub const fn new(schema: &'a str, table: &'a str, query: &'a str) -> Self {
        Self {
            schema,
            table,
            query,
            body: None,
            count: None,
            head: false,
            infinite: false,
        }
    }

    #[must_use]
    pub const fn with_count(mut self, count: CountMethod) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub const fn with_body(mut self, body: &'a Row) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub const fn infinite(mut self) -> Self {
        self.infinite = true;
        self
    }
}

/// Encode one query into its cache key.
#[must_use]
pub fn encode(parts: &KeyParts<'_>) -> String {
    let query_key = canonicalize_query(parts.query);
    let order_by_key = query_param(&query_key, "order").unwrap_or_default();
    let count = parts.count.map_or(NULL_SEGMENT, CountMethod::as_str);

    let segments = [
        KEY_PREFIX.to_string(),
        if parts.infinite {
            INFINITE_MARKER
        } else {
            PAGE_MARKER
        }
        .to_string(),
        parts.schema.to_string(),
        parts.table.to_string(),
        query_key,
        parts
            .body
            .map_or_else(|| NULL_SEGMENT.to_string(), encode_object),
        format!("{COUNT_FIELD}{count}"),
        format!("{HEAD_FIELD}{}", parts.head),
        order_by_key,
    ];

    segments.join(&KEY_SEPARATOR.to_string())
}

/// Decode one cache key. Total and pure.
#[must_use]
pub fn decode(key: &str) -> Option<DecodedKey> {
    let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    let [
        prefix,
        marker,
        schema,
        table,
        query_key,
        body,
        count,
        head,
        order_by_key,
    ] = segments.as_slice()
    else {
        return None;
    };

    if *prefix != KEY_PREFIX || schema.is_empty() || table.is_empty() {
        return None;
    }
    let is_infinite = match *marker {
        PAGE_MARKER => false,
        INFINITE_MARKER => true,
        _ => return None,
    };

    let count = match count.strip_prefix(COUNT_FIELD)? {
        NULL_SEGMENT => None,
        method => Some(method.parse::<CountMethod>().ok()?),
    };
    let is_head = match head.strip_prefix(HEAD_FIELD)? {
        "true" => true,
        "false" => false,
        _ => return None,
    };

    // a limit is only meaningful when positive; anything else is not ours
    let limit = match query_param(query_key, "limit") {
        Some(raw) => Some(raw.parse::<NonZeroUsize>().ok()?),
        None => None,
    };
    let offset = match query_param(query_key, "offset") {
        Some(raw) => Some(raw.parse::<usize>().ok()?),
        None => None,
    };

    Some(DecodedKey {
        schema: (*schema).to_string(),
        table: (*table).to_string(),
        query_key: (*query_key).to_string(),
        limit,
        offset,
        order_by_key: (!order_by_key.is_empty()).then(|| (*order_by_key).to_string()),
        body_key: (*body != NULL_SEGMENT).then(|| (*body).to_string()),
        count,
        is_head,
        is_infinite,
    })
}
