use crate::{
    filter::Filter,
    mutate::{cache::MutatorFn, shape::CachedValue},
    order::OrderSpec,
    value::{Row, Value, loose_eq},
};
use serde_json::Value as JsonValue;
use std::{fmt, num::NonZeroUsize, sync::Arc};

///
/// UpsertQuery
///
/// Window hints decoded from the cached query: page size and sort order.
///

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpsertQuery {
    pub limit: Option<NonZeroUsize>,
    pub order_by: Option<OrderSpec>,
}

/// Merge an existing cached row with mutation input.
pub type MergeFn = Arc<dyn Fn(&Row, &Row) -> Row + Send + Sync>;

///
/// UpsertMutatorConfig
///

#[derive(Clone, Default)]
pub struct UpsertMutatorConfig {
    /// Replaces [`default_merge`] when set.
    pub merge: Option<MergeFn>,
}

impl UpsertMutatorConfig {
    #[must_use]
    pub fn with_merge(merge: impl Fn(&Row, &Row) -> Row + Send + Sync + 'static) -> Self {
        Self {
            merge: Some(Arc::new(merge)),
        }
    }
}

impl fmt::Debug for UpsertMutatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpsertMutatorConfig")
            .field("merge", &self.merge.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Deep merge: nested objects merge recursively, every other input value
/// replaces the existing one.
#[must_use]
pub fn default_merge(existing: &Row, input: &Row) -> Row {
    let mut out = existing.clone();
    for (key, value) in input {
        match (out.get_mut(key), value) {
            (Some(JsonValue::Object(current)), JsonValue::Object(patch)) => {
                *current = default_merge(current, patch);
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    out
}

/// Build the transform that inserts or updates `input` in one cached value.
///
/// Rows are matched by primary key. A merged row that no longer passes
/// `filter.apply` leaves the cached value.
#[must_use]
pub fn build_upsert_mutator_fn(
    input: Row,
    primary_keys: Vec<String>,
    filter: Arc<Filter>,
    query: UpsertQuery,
    config: &UpsertMutatorConfig,
) -> MutatorFn {
    let merge = config.merge.clone();
    let upsert = Upsert {
        input,
        primary_keys,
        filter,
        query,
        merge,
    };

    Box::new(move |current| upsert.apply(current))
}

struct Upsert {
    input: Row,
    primary_keys: Vec<String>,
    filter: Arc<Filter>,
    query: UpsertQuery,
    merge: Option<MergeFn>,
}

impl Upsert {
    fn apply(&self, current: CachedValue) -> CachedValue {
        match current {
            CachedValue::Row(Some(row))
                if primary_keys_match(&row, &self.input, &self.primary_keys) =>
            {
                CachedValue::Row(Some(self.merge(&row)))
            }
            CachedValue::Row(row) => CachedValue::Row(row),
            CachedValue::Rows(mut rows) => {
                self.upsert_rows(&mut rows);
                self.truncate(&mut rows);
                CachedValue::Rows(rows)
            }
            CachedValue::Paginated { mut data, count } => {
                let delta = self.upsert_rows(&mut data);
                self.truncate(&mut data);
                CachedValue::Paginated {
                    data,
                    count: count.map(|c| c.saturating_add_signed(delta)),
                }
            }
            CachedValue::Pages(pages) => {
                let page_size = self
                    .query
                    .limit
                    .map(NonZeroUsize::get)
                    .or_else(|| pages.first().map(Vec::len))
                    .filter(|size| *size > 0);
                let had_pages = !pages.is_empty();

                let mut rows: Vec<Row> = pages.into_iter().flatten().collect();
                self.upsert_rows(&mut rows);

                CachedValue::Pages(chunk(rows, page_size, had_pages))
            }
        }
    }

    // Upsert into a flat list and return the net change in row count.
    fn upsert_rows(&self, rows: &mut Vec<Row>) -> i64 {
        let found = rows
            .iter()
            .position(|row| primary_keys_match(row, &self.input, &self.primary_keys));

        let merged = match found {
            Some(index) => self.merge(&rows.remove(index)),
            None => self.input.clone(),
        };

        let keep = self.filter.apply(&merged);
        if keep {
            let index = match (&self.query.order_by, found) {
                (Some(order), _) => order.insertion_index(rows, &merged),
                (None, Some(index)) => index,
                (None, None) => rows.len(),
            };
            rows.insert(index, merged);
        }

        match (found.is_some(), keep) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        }
    }

    fn truncate(&self, rows: &mut Vec<Row>) {
        if let Some(limit) = self.query.limit {
            rows.truncate(limit.get());
        }
    }

    fn merge(&self, existing: &Row) -> Row {
        match &self.merge {
            Some(merge) => merge(existing, &self.input),
            None => default_merge(existing, &self.input),
        }
    }
}

fn chunk(rows: Vec<Row>, page_size: Option<usize>, had_pages: bool) -> Vec<Vec<Row>> {
    if rows.is_empty() {
        return if had_pages { vec![Vec::new()] } else { Vec::new() };
    }

    match page_size {
        Some(size) => rows.chunks(size).map(<[Row]>::to_vec).collect(),
        None => vec![rows],
    }
}

/// Return true when every primary key is present in both rows and equal.
pub(crate) fn primary_keys_match(row: &Row, input: &Row, primary_keys: &[String]) -> bool {
    primary_keys.iter().all(|pk| match (row.get(pk), input.get(pk)) {
        (Some(a), Some(b)) if !a.is_null() && !b.is_null() => {
            loose_eq(&Value::from_json(a), &Value::from_json(b))
        }
        _ => false,
    })
}
