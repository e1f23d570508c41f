use crate::filter::{error::FilterParseError, parse::split_top_level};

///
/// SelectPath
///
/// One column reached by a `select` clause.
/// `path` is where the value lives in normalized mutation input;
/// `alias` is where the cached response carries it.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectPath {
    pub declaration: String,
    pub path: String,
    pub alias: String,
}

impl SelectPath {
    #[must_use]
    pub fn is_aliased(&self) -> bool {
        self.path != self.alias
    }
}

/// Parse a `select` clause into the flat list of columns it reaches.
///
/// Supports aliases (`alias:column`), casts (`column::text`), JSON paths
/// (`data->>name`), embedded resources with hints
/// (`author:users!author_id(name)`) and spreads (`...users(name)`).
/// `*` selects no specific path.
pub(crate) fn parse_select(select: &str) -> Result<Vec<SelectPath>, FilterParseError> {
    let mut out = Vec::new();
    parse_level(select, select, "", "", &mut out)?;

    Ok(out)
}

fn parse_level(
    whole: &str,
    level: &str,
    path_prefix: &str,
    alias_prefix: &str,
    out: &mut Vec<SelectPath>,
) -> Result<(), FilterParseError> {
    let items = split_top_level(level, ',').map_err(|reason| invalid(whole, reason))?;

    for item in items.into_iter().map(str::trim).filter(|i| !i.is_empty()) {
        if item == "*" {
            continue;
        }

        let (spread, body) = match item.strip_prefix("...") {
            Some(rest) => (true, rest),
            None => (false, item),
        };

        if let Some(open) = body.find('(') {
            let inner = body[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| invalid(whole, format!("unclosed embedding in '{item}'")))?;
            let (alias, relation) = split_alias(&body[..open]);
            let relation = relation.split('!').next().unwrap_or(relation).trim();
            if relation.is_empty() {
                return Err(invalid(whole, format!("embedding without a relation in '{item}'")));
            }

            let path = join(path_prefix, relation);
            let alias_path = if spread {
                alias_prefix.to_string()
            } else {
                join(alias_prefix, alias.unwrap_or(relation))
            };
            parse_level(whole, inner, &path, &alias_path, out)?;
            continue;
        }

        let column = body.split_once("::").map_or(body, |(column, _)| column);
        let (alias, column) = split_alias(column);
        let column = column.trim();
        if column.is_empty() {
            return Err(invalid(whole, format!("empty column in '{item}'")));
        }

        let default_alias = column
            .rsplit("->")
            .next()
            .map_or(column, |last| last.trim_start_matches('>'));
        out.push(SelectPath {
            declaration: item.to_string(),
            path: join(path_prefix, column),
            alias: join(alias_prefix, alias.unwrap_or(default_alias)),
        });
    }

    Ok(())
}

// `alias:rest` → (Some(alias), rest); casts have already been stripped.
fn split_alias(head: &str) -> (Option<&str>, &str) {
    match head.split_once(':') {
        Some((alias, rest)) if !alias.trim().is_empty() => (Some(alias.trim()), rest),
        _ => (None, head),
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn invalid(select: &str, reason: impl Into<String>) -> FilterParseError {
    FilterParseError::InvalidSelect {
        select: select.to_string(),
        reason: reason.into(),
    }
}
