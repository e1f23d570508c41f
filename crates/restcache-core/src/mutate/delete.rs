use crate::{
    mutate::{cache::MutatorFn, shape::CachedValue, upsert::primary_keys_match},
    value::Row,
};

/// Build the transform that removes the row matching `input` by primary key.
///
/// At most one row is removed. A count, when present, is decremented only
/// if a row was removed.
#[must_use]
pub fn build_delete_mutator_fn(input: Row, primary_keys: Vec<String>) -> MutatorFn {
    Box::new(move |current| delete_from(current, &input, &primary_keys))
}

fn delete_from(current: CachedValue, input: &Row, primary_keys: &[String]) -> CachedValue {
    let matches = |row: &Row| primary_keys_match(row, input, primary_keys);

    match current {
        CachedValue::Row(Some(row)) if matches(&row) => CachedValue::Row(None),
        CachedValue::Row(row) => CachedValue::Row(row),
        CachedValue::Rows(mut rows) => {
            remove_first(&mut rows, matches);
            CachedValue::Rows(rows)
        }
        CachedValue::Paginated { mut data, count } => {
            let removed = remove_first(&mut data, matches);
            CachedValue::Paginated {
                data,
                count: count.map(|c| if removed { c.saturating_sub(1) } else { c }),
            }
        }
        CachedValue::Pages(mut pages) => {
            for page in &mut pages {
                if remove_first(page, matches) {
                    break;
                }
            }
            CachedValue::Pages(pages)
        }
    }
}

fn remove_first(rows: &mut Vec<Row>, matches: impl Fn(&Row) -> bool) -> bool {
    match rows.iter().position(matches) {
        Some(index) => {
            rows.remove(index);
            true
        }
        None => false,
    }
}
