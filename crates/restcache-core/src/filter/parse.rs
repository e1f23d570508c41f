use crate::{
    filter::{
        ast::{
            FilterGroup, FilterNode, FilterOperator, FilterPredicate, GroupKind, Quantifier,
            UNSUPPORTED_OPERATORS,
        },
        error::FilterParseError,
    },
    key::query_params,
    value::{Value, parse_value},
};
use regex_lite::Regex;

/// Parameters that shape the response rather than filter rows.
const RESERVED_PARAMS: [&str; 6] = ["select", "order", "limit", "offset", "on_conflict", "columns"];

/// Modifiers that may be scoped to an embedded resource (`author.order=...`).
const EMBEDDED_MODIFIERS: [&str; 3] = ["order", "limit", "offset"];

///
/// ParsedQuery
///

pub(crate) struct ParsedQuery {
    pub(crate) root: FilterGroup,
    pub(crate) select: Option<String>,
}

/// Parse the filter parameters of one query string into an AND root.
pub(crate) fn parse_query(query: &str) -> Result<ParsedQuery, FilterParseError> {
    let mut children = Vec::new();
    let mut select = None;

    for (key, value) in query_params(query) {
        if key == "select" {
            select = Some(value);
            continue;
        }
        if is_reserved(&key) {
            continue;
        }

        let node = match logical_key(&key) {
            Some((prefix, kind, negated)) => {
                FilterNode::Group(parse_group(&value, prefix.as_deref(), kind, negated)?)
            }
            None => FilterNode::Predicate(parse_predicate(&key, &value)?),
        };
        children.push(node);
    }

    Ok(ParsedQuery {
        root: FilterGroup::and(children),
        select,
    })
}

fn is_reserved(key: &str) -> bool {
    RESERVED_PARAMS.contains(&key)
        || key
            .rsplit_once('.')
            .is_some_and(|(_, last)| EMBEDDED_MODIFIERS.contains(&last))
}

// Recognise `or`, `and`, `not.or`, `not.and`, optionally scoped to an
// embedded resource (`author.or`).
fn logical_key(key: &str) -> Option<(Option<String>, GroupKind, bool)> {
    let mut segments: Vec<&str> = key.split('.').collect();
    let kind = match segments.pop()? {
        "or" => GroupKind::Or,
        "and" => GroupKind::And,
        _ => return None,
    };

    let negated = segments.last() == Some(&"not");
    if negated {
        segments.pop();
    }
    let prefix = (!segments.is_empty()).then(|| segments.join("."));

    Some((prefix, kind, negated))
}

// Parse `(item,item,...)` into one group.
fn parse_group(
    body: &str,
    prefix: Option<&str>,
    kind: GroupKind,
    negated: bool,
) -> Result<FilterGroup, FilterParseError> {
    let inner = body
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| FilterParseError::invalid_group(body, "expected a parenthesized list"))?;

    let items = split_top_level(inner, ',')
        .map_err(|reason| FilterParseError::invalid_group(body, reason))?;
    if items.is_empty() {
        return Err(FilterParseError::invalid_group(body, "empty logical group"));
    }

    let children = items
        .into_iter()
        .map(|item| parse_group_item(item, prefix))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FilterGroup {
        kind,
        negated,
        children,
    })
}

// One entry inside a logical group: a nested group or `column.op.value`.
fn parse_group_item(item: &str, prefix: Option<&str>) -> Result<FilterNode, FilterParseError> {
    let item = item.trim();
    let (negated, rest) = match item.strip_prefix("not.") {
        Some(rest) if rest.starts_with("and(") || rest.starts_with("or(") => (true, rest),
        _ => (false, item),
    };

    for (word, kind) in [("and", GroupKind::And), ("or", GroupKind::Or)] {
        if let Some(body) = rest.strip_prefix(word).filter(|b| b.starts_with('(')) {
            return parse_group(body, prefix, kind, negated).map(FilterNode::Group);
        }
    }

    let (column, operation) = item
        .split_once('.')
        .ok_or_else(|| FilterParseError::MissingOperator {
            param: item.to_string(),
        })?;
    let path = match prefix {
        Some(prefix) => format!("{prefix}.{column}"),
        None => column.to_string(),
    };

    parse_predicate(&path, operation).map(FilterNode::Predicate)
}

/// Parse `[not.]op[(modifier)].value` for one column path.
pub(crate) fn parse_predicate(
    path: &str,
    operation: &str,
) -> Result<FilterPredicate, FilterParseError> {
    let (negated, rest) = match operation.strip_prefix("not.") {
        Some(rest) => (true, rest),
        None => (false, operation),
    };
    let (token, raw) = rest
        .split_once('.')
        .ok_or_else(|| FilterParseError::MissingOperator {
            param: path.to_string(),
        })?;

    let (op_token, modifier) = match token.split_once('(') {
        Some((op, modifier)) => match modifier.strip_suffix(')') {
            Some(modifier) => (op, Some(modifier)),
            None => {
                return Err(FilterParseError::InvalidModifier {
                    path: path.to_string(),
                    token: op.to_string(),
                    modifier: modifier.to_string(),
                });
            }
        },
        None => (token, None),
    };
    if UNSUPPORTED_OPERATORS.contains(&op_token) {
        return Err(FilterParseError::UnsupportedOperator {
            path: path.to_string(),
            token: op_token.to_string(),
        });
    }
    let operator =
        FilterOperator::from_token(op_token).ok_or_else(|| FilterParseError::UnknownOperator {
            path: path.to_string(),
            token: op_token.to_string(),
        })?;

    let quantifier = match modifier {
        None => None,
        // full-text operators carry a text-search configuration here
        Some(_) if operator.is_text_search() => None,
        Some("any") if operator.accepts_quantifier() => Some(Quantifier::Any),
        Some("all") if operator.accepts_quantifier() => Some(Quantifier::All),
        Some(other) => {
            return Err(FilterParseError::InvalidModifier {
                path: path.to_string(),
                token: op_token.to_string(),
                modifier: other.to_string(),
            });
        }
    };

    let value = parse_operand(path, operator, quantifier, raw)?;
    let patterns = compile_patterns(path, operator, &value)?;

    Ok(FilterPredicate {
        path: path.to_string(),
        operator,
        quantifier,
        value,
        negated,
        patterns,
    })
}

fn parse_operand(
    path: &str,
    operator: FilterOperator,
    quantifier: Option<Quantifier>,
    raw: &str,
) -> Result<Value, FilterParseError> {
    let token = operator.token();
    let scalar = |item: &str| {
        if operator.is_pattern() {
            Value::Text(unquote(item))
        } else {
            parse_value(item)
        }
    };

    if quantifier.is_some() {
        let inner = strip_delimiters(raw, '{', '}')
            .ok_or_else(|| FilterParseError::invalid_operand(path, token, "expected {a,b,...}"))?;
        let items = split_top_level(inner, ',')
            .map_err(|reason| FilterParseError::invalid_operand(path, token, reason))?;
        return Ok(Value::List(items.into_iter().map(|i| scalar(i.trim())).collect()));
    }

    match operator {
        FilterOperator::In => {
            let inner = strip_delimiters(raw, '(', ')').ok_or_else(|| {
                FilterParseError::invalid_operand(path, token, "expected (a,b,...)")
            })?;
            let items = split_top_level(inner, ',')
                .map_err(|reason| FilterParseError::invalid_operand(path, token, reason))?;
            Ok(Value::List(
                items.into_iter().map(|i| parse_value(i.trim())).collect(),
            ))
        }
        FilterOperator::Is => match raw.to_ascii_lowercase().as_str() {
            "null" | "unknown" => Ok(Value::Null),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(FilterParseError::invalid_operand(
                path,
                token,
                "expected null, true, false or unknown",
            )),
        },
        FilterOperator::Contains | FilterOperator::ContainedBy | FilterOperator::Overlaps => {
            parse_container(path, token, raw)
        }
        op if op.is_pattern() || op.is_text_search() => Ok(Value::Text(unquote(raw))),
        _ => Ok(parse_value(raw)),
    }
}

// `{"k":1}` JSON objects, `[1,2]` JSON arrays, or `{a,b}` array literals.
fn parse_container(path: &str, token: &'static str, raw: &str) -> Result<Value, FilterParseError> {
    let raw = raw.trim();
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(raw)
        && (json.is_object() || json.is_array())
    {
        return Ok(Value::from_json(&json));
    }

    let inner = strip_delimiters(raw, '{', '}').ok_or_else(|| {
        FilterParseError::invalid_operand(path, token, "range literals are not supported")
    })?;
    let items = split_top_level(inner, ',')
        .map_err(|reason| FilterParseError::invalid_operand(path, token, reason))?;

    Ok(Value::List(
        items.into_iter().map(|i| parse_value(i.trim())).collect(),
    ))
}

fn compile_patterns(
    path: &str,
    operator: FilterOperator,
    value: &Value,
) -> Result<Vec<Regex>, FilterParseError> {
    if !operator.is_pattern() {
        return Ok(Vec::new());
    }

    let sources: Vec<&str> = match value {
        Value::Text(text) => vec![text.as_str()],
        Value::List(items) => items.iter().filter_map(Value::as_text).collect(),
        _ => Vec::new(),
    };

    sources
        .into_iter()
        .map(|source| {
            let pattern = match operator {
                FilterOperator::Like => like_to_regex(source, false),
                FilterOperator::Ilike => like_to_regex(source, true),
                FilterOperator::Imatch => format!("(?i){source}"),
                _ => source.to_string(),
            };
            Regex::new(&pattern).map_err(|err| {
                FilterParseError::invalid_operand(path, operator.token(), err.to_string())
            })
        })
        .collect()
}

// Translate a LIKE pattern (`%`/`*` any run, `_` one char, `\` escape).
fn like_to_regex(pattern: &str, case_insensitive: bool) -> String {
    let mut out = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '%' | '*' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex_lite::escape(&next.to_string()));
                }
            }
            other => out.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    out.push('$');

    out
}

fn strip_delimiters(raw: &str, open: char, close: char) -> Option<&str> {
    raw.trim().strip_prefix(open)?.strip_suffix(close)
}

// Remove surrounding double quotes, honouring JSON escapes when present.
fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return serde_json::from_str::<String>(trimmed)
            .unwrap_or_else(|_| trimmed[1..trimmed.len() - 1].to_string());
    }

    raw.to_string()
}

/// Split on `sep` outside quotes and brackets.
pub(crate) fn split_top_level(input: &str, sep: char) -> Result<Vec<&str>, String> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '(' | '{' | '[' if !in_quotes => depth += 1,
            ')' | '}' | ']' if !in_quotes => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced '{c}' at {idx}"))?;
            }
            c if c == sep && !in_quotes && depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err("unterminated quoted value".to_string());
    }
    if depth != 0 {
        return Err("unbalanced brackets".to_string());
    }
    parts.push(&input[start..]);

    Ok(parts)
}
