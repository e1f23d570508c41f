use crate::value::Row;
use serde_json::Value as JsonValue;
use url::form_urlencoded;

/// Decode one query string into its ordered parameter pairs.
#[must_use]
pub fn query_params(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Return the first value of parameter `name`.
#[must_use]
pub fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Canonicalize a query string.
///
/// Parameters are sorted by `key + value` and re-encoded, so two requests
/// that differ only in parameter order produce the same query key.
#[must_use]
pub fn canonicalize_query(query: &str) -> String {
    let mut params = query_params(query);
    params.sort_by_cached_key(|(k, v)| format!("{k}{v}"));

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Encode a request body as a canonical, url-encoded parameter list.
///
/// Every leaf is written under its dotted path (array elements by index);
/// `null` leaves are omitted. The result never contains the key separator.
#[must_use]
pub fn encode_object(body: &Row) -> String {
    let mut params = Vec::new();
    for (key, value) in body {
        leaf_params(key, value, &mut params);
    }
    params.sort_by_cached_key(|(k, v)| format!("{k}{v}"));

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

fn leaf_params(path: &str, value: &JsonValue, out: &mut Vec<(String, String)>) {
    match value {
        JsonValue::Null => {}
        JsonValue::Object(map) => {
            for (key, value) in map {
                leaf_params(&format!("{path}.{key}"), value, out);
            }
        }
        JsonValue::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                leaf_params(&format!("{path}.{index}"), value, out);
            }
        }
        JsonValue::String(s) => out.push((path.to_string(), s.clone())),
        JsonValue::Bool(b) => out.push((path.to_string(), b.to_string())),
        JsonValue::Number(n) => out.push((path.to_string(), n.to_string())),
    }
}
