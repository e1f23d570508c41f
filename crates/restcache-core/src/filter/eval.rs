//! Three-valued filter evaluation.
//!
//! Every node evaluates to `Some(true)`, `Some(false)`, or `None` (SQL
//! `unknown`). Comparisons against a missing or null column are unknown,
//! negation keeps unknown unknown, and only `Some(true)` counts as a match.

use crate::{
    filter::ast::{FilterGroup, FilterNode, FilterOperator, FilterPredicate, GroupKind, Quantifier},
    value::{Row, Value, lookup, loose_eq, strict_order_cmp},
};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Evaluate one group against one row.
pub(crate) fn eval_group(group: &FilterGroup, row: &Row) -> Option<bool> {
    // emptied groups are vacuously true
    if group.children.is_empty() {
        return Some(true);
    }

    let results = group.children.iter().map(|child| eval_node(child, row));
    let result = match group.kind {
        GroupKind::And => kleene_all(results),
        GroupKind::Or => kleene_any(results),
    };

    negate_if(group.negated, result)
}

fn eval_node(node: &FilterNode, row: &Row) -> Option<bool> {
    match node {
        FilterNode::Predicate(pred) => eval_predicate(pred, row),
        FilterNode::Group(group) => eval_group(group, row),
    }
}

fn eval_predicate(pred: &FilterPredicate, row: &Row) -> Option<bool> {
    let raw = lookup(row, &pred.path).filter(|v| !v.is_null());
    let result = eval_operator(pred, raw);

    negate_if(pred.negated, result)
}

// Evaluate the operator itself; `raw` is `None` for missing and null columns.
fn eval_operator(pred: &FilterPredicate, raw: Option<&JsonValue>) -> Option<bool> {
    match pred.operator {
        FilterOperator::Is => Some(match (&pred.value, raw) {
            (Value::Null, actual) => actual.is_none(),
            (expected, Some(actual)) => loose_eq(&Value::from_json(actual), expected),
            (_, None) => false,
        }),
        FilterOperator::IsDistinct => Some(match (raw, &pred.value) {
            (None, Value::Null) => false,
            (None, _) | (Some(_), Value::Null) => true,
            (Some(actual), expected) => !loose_eq(&Value::from_json(actual), expected),
        }),
        op => {
            let raw = raw?;
            let actual = Value::from_json(raw);
            eval_present(pred, op, raw, &actual)
        }
    }
}

fn eval_present(
    pred: &FilterPredicate,
    op: FilterOperator,
    raw: &JsonValue,
    actual: &Value,
) -> Option<bool> {
    match op {
        FilterOperator::Eq => quantified(pred, |lit| compare(actual, lit, Ordering::is_eq, true)),
        FilterOperator::Neq => compare(actual, &pred.value, Ordering::is_ne, true),
        FilterOperator::Gt => quantified(pred, |lit| compare(actual, lit, Ordering::is_gt, false)),
        FilterOperator::Gte => quantified(pred, |lit| compare(actual, lit, Ordering::is_ge, false)),
        FilterOperator::Lt => quantified(pred, |lit| compare(actual, lit, Ordering::is_lt, false)),
        FilterOperator::Lte => quantified(pred, |lit| compare(actual, lit, Ordering::is_le, false)),
        FilterOperator::Like
        | FilterOperator::Ilike
        | FilterOperator::Match
        | FilterOperator::Imatch => {
            let text = raw.as_str()?;
            let mut hits = pred.patterns.iter().map(|re| Some(re.is_match(text)));
            match pred.quantifier {
                None => hits.next().flatten(),
                Some(Quantifier::Any) => kleene_any(hits),
                Some(Quantifier::All) => kleene_all(hits),
            }
        }
        FilterOperator::In => {
            let list = pred.value.as_list()?;
            kleene_any(
                list.iter()
                    .map(|lit| compare(actual, lit, Ordering::is_eq, true)),
            )
        }
        FilterOperator::Contains => contains(actual, &pred.value),
        FilterOperator::ContainedBy => contains(&pred.value, actual),
        FilterOperator::Overlaps => match (actual, &pred.value) {
            (Value::List(a), Value::List(b)) => {
                Some(a.iter().any(|x| b.iter().any(|y| loose_eq(x, y))))
            }
            _ => None,
        },
        FilterOperator::Fts
        | FilterOperator::Plfts
        | FilterOperator::Phfts
        | FilterOperator::Wfts => text_search(op, raw.as_str()?, pred.value.as_text()?),
        FilterOperator::Is | FilterOperator::IsDistinct => None,
    }
}

// Compare against one literal; a null literal makes the comparison unknown.
// `equality` selects loose equality instead of ordering.
fn compare(
    actual: &Value,
    literal: &Value,
    accept: impl Fn(Ordering) -> bool,
    equality: bool,
) -> Option<bool> {
    if literal.is_null() {
        return None;
    }
    if equality {
        let ord = if loose_eq(actual, literal) {
            Ordering::Equal
        } else {
            Ordering::Less
        };
        return Some(accept(ord));
    }

    strict_order_cmp(actual, literal).map(accept)
}

fn quantified(pred: &FilterPredicate, f: impl Fn(&Value) -> Option<bool>) -> Option<bool> {
    match pred.quantifier {
        None => f(&pred.value),
        Some(quantifier) => {
            let list = pred.value.as_list()?;
            let results = list.iter().map(&f);
            match quantifier {
                Quantifier::Any => kleene_any(results),
                Quantifier::All => kleene_all(results),
            }
        }
    }
}

///
/// Containment
///

fn contains(outer: &Value, inner: &Value) -> Option<bool> {
    match (outer, inner) {
        (Value::List(outer), Value::List(inner)) => Some(
            inner
                .iter()
                .all(|needle| outer.iter().any(|item| element_contains(item, needle))),
        ),
        (Value::Object(outer), Value::Object(inner)) => Some(json_contains(
            &JsonValue::Object(outer.clone()),
            &JsonValue::Object(inner.clone()),
        )),
        _ => None,
    }
}

fn element_contains(item: &Value, needle: &Value) -> bool {
    match (item, needle) {
        (Value::Object(_), Value::Object(_)) | (Value::List(_), Value::List(_)) => {
            contains(item, needle).unwrap_or(false)
        }
        _ => loose_eq(item, needle),
    }
}

// jsonb `@>` semantics.
fn json_contains(outer: &JsonValue, inner: &JsonValue) -> bool {
    match (outer, inner) {
        (JsonValue::Object(outer), JsonValue::Object(inner)) => inner
            .iter()
            .all(|(k, v)| outer.get(k).is_some_and(|o| json_contains(o, v))),
        (JsonValue::Array(outer), JsonValue::Array(inner)) => inner
            .iter()
            .all(|v| outer.iter().any(|o| json_contains(o, v))),
        (JsonValue::Array(outer), scalar) if !scalar.is_object() => {
            outer.iter().any(|o| json_contains(o, scalar))
        }
        (outer, inner) => loose_eq(&Value::from_json(outer), &Value::from_json(inner)),
    }
}

///
/// Full-text search
///
/// Approximates `to_tsvector @@ query` with lowercase word matching; no
/// stemming or stop words.
///

fn text_search(op: FilterOperator, text: &str, query: &str) -> Option<bool> {
    let words = tokenize(text);
    let has = |term: &str| {
        term.strip_suffix(":*").map_or_else(
            || words.iter().any(|w| w == term),
            |prefix| words.iter().any(|w| w.starts_with(prefix)),
        )
    };

    let matched = match op {
        FilterOperator::Plfts => tokenize(query).iter().all(|t| has(t)),
        FilterOperator::Phfts => {
            let phrase = tokenize(query);
            phrase.is_empty() || words.windows(phrase.len()).any(|w| w == phrase.as_slice())
        }
        FilterOperator::Fts => query.split('|').any(|alternative| {
            alternative
                .split(['&', ' '])
                .map(|t| t.trim_matches(|c: char| c == '(' || c == ')' || c == '\''))
                .filter(|t| !t.is_empty())
                .all(|t| match t.strip_prefix('!') {
                    Some(excluded) => !has(&excluded.to_lowercase()),
                    None => has(&t.to_lowercase()),
                })
        }),
        FilterOperator::Wfts => query
            .to_lowercase()
            .split(" or ")
            .any(|alternative| websearch_alternative(alternative, &words)),
        _ => return None,
    };

    Some(matched)
}

fn websearch_alternative(alternative: &str, words: &[String]) -> bool {
    let mut remaining = alternative;
    let mut ok = true;

    // quoted phrases first
    while let Some(start) = remaining.find('"') {
        let after = &remaining[start + 1..];
        let Some(end) = after.find('"') else {
            break;
        };
        let phrase = tokenize(&after[..end]);
        ok &= phrase.is_empty() || words.windows(phrase.len()).any(|w| w == phrase.as_slice());
        remaining = &after[end + 1..];
    }

    ok && remaining.split_whitespace().all(|term| match term.strip_prefix('-') {
        Some(excluded) => tokenize(excluded).iter().all(|t| !words.contains(t)),
        None => tokenize(term).iter().all(|t| words.contains(t)),
    })
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != ':' && c != '*')
        .map(|w| w.trim_matches(':').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

///
/// Kleene logic
///

fn kleene_all(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for result in results {
        match result {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }

    (!unknown).then_some(true)
}

fn kleene_any(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for result in results {
        match result {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }

    (!unknown).then_some(false)
}

const fn negate_if(negated: bool, result: Option<bool>) -> Option<bool> {
    match result {
        Some(b) if negated => Some(!b),
        other => other,
    }
}
