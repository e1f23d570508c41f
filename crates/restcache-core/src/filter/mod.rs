//! PostgREST horizontal-filter parsing and client-side evaluation.
//!
//! A [`Filter`] is parsed once per cached query and then evaluated against
//! mutated rows to decide whether they belong to the cached result.

mod ast;
mod denormalize;
mod error;
mod eval;
mod memo;
mod parse;
mod select;

#[cfg(test)]
mod tests;

pub use ast::{
    FilterGroup, FilterNode, FilterOperator, FilterPredicate, GroupKind, Quantifier,
};
pub use error::FilterParseError;
pub use memo::FilterMemo;
pub use select::SelectPath;

use crate::value::{Row, has_path};
use std::collections::BTreeSet;

///
/// FilterOptions
///
/// `exclusive_paths` restricts evaluation to predicates on the listed
/// paths; every other predicate is dropped at parse time.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct FilterOptions {
    pub exclusive_paths: Option<BTreeSet<String>>,
}

impl FilterOptions {
    #[must_use]
    pub fn exclusive<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclusive_paths: Some(paths.into_iter().map(Into::into).collect()),
        }
    }
}

///
/// Filter
///
/// Parsed predicate tree of one query string, the paths it references,
/// and the columns its `select` clause reaches.
///

#[derive(Clone, Debug)]
pub struct Filter {
    root: FilterGroup,
    paths: BTreeSet<String>,
    select: Vec<SelectPath>,
}

impl Filter {
    /// Parse the filter parameters and `select` clause of `query_key`.
    pub fn parse(query_key: &str, options: &FilterOptions) -> Result<Self, FilterParseError> {
        let parsed = parse::parse_query(query_key)?;
        let select = match parsed.select.as_deref() {
            Some(select) => select::parse_select(select)?,
            None => Vec::new(),
        };

        let root = match &options.exclusive_paths {
            Some(keep) => parsed.root.retain_paths(&|path| keep.contains(path)),
            None => parsed.root,
        };

        let mut paths = BTreeSet::new();
        root.walk(false, &mut |pred, _| {
            paths.insert(pred.path.clone());
        });

        Ok(Self {
            root,
            paths,
            select,
        })
    }

    #[must_use]
    pub const fn root(&self) -> &FilterGroup {
        &self.root
    }

    /// Every path referenced by a predicate.
    #[must_use]
    pub const fn paths(&self) -> &BTreeSet<String> {
        &self.paths
    }

    #[must_use]
    pub fn select_paths(&self) -> &[SelectPath] {
        &self.select
    }

    /// Return true when every path is referenced somewhere in the tree.
    #[must_use]
    pub fn has_paths<S: AsRef<str>>(&self, paths: &[S]) -> bool {
        paths.iter().all(|p| self.paths.contains(p.as_ref()))
    }

    /// Return true when every path is pinned by at least one non-negated
    /// `eq` or `in` predicate.
    #[must_use]
    pub fn has_filters_on_paths<S: AsRef<str>>(&self, paths: &[S]) -> bool {
        let mut pinned = BTreeSet::new();
        self.root.walk(false, &mut |pred, negated| {
            if !negated && pred.is_equality_class() {
                pinned.insert(pred.path.as_str());
            }
        });

        paths.iter().all(|p| pinned.contains(p.as_ref()))
    }

    /// Evaluate the whole tree; only a definite `true` matches.
    #[must_use]
    pub fn apply_filters(&self, row: &Row) -> bool {
        eval::eval_group(&self.root, row) == Some(true)
    }

    /// Evaluate only the predicates on `paths`.
    #[must_use]
    pub fn apply_filters_on_paths<S: AsRef<str>>(&self, row: &Row, paths: &[S]) -> bool {
        let scoped = self
            .root
            .retain_paths(&|path| paths.iter().any(|p| p.as_ref() == path));

        eval::eval_group(&scoped, row) == Some(true)
    }

    /// Return true when the row carries every selected column and passes
    /// the filters.
    #[must_use]
    pub fn apply(&self, row: &Row) -> bool {
        self.select.iter().all(|sel| has_path(row, &sel.alias)) && self.apply_filters(row)
    }

    /// Reshape mutation input into the layout this query's rows carry.
    #[must_use]
    pub fn denormalize(&self, row: &Row) -> Row {
        denormalize::denormalize(&self.select, row)
    }
}
