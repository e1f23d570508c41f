use crate::{
    filter::select::SelectPath,
    value::{Row, lookup, set_path},
};

/// Reshape a normalized mutation row into the aliased shape a cached
/// response carries.
///
/// Plain keys are copied first, dotted keys are expanded into nested
/// objects, then each aliased select path is copied to its alias. Running
/// it on its own output changes nothing.
pub(crate) fn denormalize(select: &[SelectPath], row: &Row) -> Row {
    let mut out = Row::new();

    for (key, value) in row.iter().filter(|(k, _)| !k.contains('.')) {
        out.insert(key.clone(), value.clone());
    }
    for (key, value) in row.iter().filter(|(k, _)| k.contains('.')) {
        set_path(&mut out, key, value.clone());
    }

    for sel in select.iter().filter(|s| s.is_aliased()) {
        if let Some(value) = lookup(&out, &sel.path).cloned() {
            set_path(&mut out, &sel.alias, value);
        }
    }

    out
}
