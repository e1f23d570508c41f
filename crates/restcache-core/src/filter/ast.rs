use crate::value::Value;
use regex_lite::Regex;

///
/// Filter AST
///
/// Parsed form of the horizontal filters of one PostgREST query string.
/// This layer holds no row data; evaluation lives in `eval`.
///

///
/// FilterOperator
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Match,
    Imatch,
    Is,
    IsDistinct,
    In,
    Contains,
    ContainedBy,
    Overlaps,
    Fts,
    Plfts,
    Phfts,
    Wfts,
}

impl FilterOperator {
    /// Resolve one operator token as it appears in a query string.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "like" => Self::Like,
            "ilike" => Self::Ilike,
            "match" => Self::Match,
            "imatch" => Self::Imatch,
            "is" => Self::Is,
            "isdistinct" => Self::IsDistinct,
            "in" => Self::In,
            "cs" => Self::Contains,
            "cd" => Self::ContainedBy,
            "ov" => Self::Overlaps,
            "fts" => Self::Fts,
            "plfts" => Self::Plfts,
            "phfts" => Self::Phfts,
            "wfts" => Self::Wfts,
            _ => return None,
        };

        Some(op)
    }

    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::Match => "match",
            Self::Imatch => "imatch",
            Self::Is => "is",
            Self::IsDistinct => "isdistinct",
            Self::In => "in",
            Self::Contains => "cs",
            Self::ContainedBy => "cd",
            Self::Overlaps => "ov",
            Self::Fts => "fts",
            Self::Plfts => "plfts",
            Self::Phfts => "phfts",
            Self::Wfts => "wfts",
        }
    }

    /// Operators that accept an `(any)` / `(all)` modifier.
    #[must_use]
    pub const fn accepts_quantifier(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Gt
                | Self::Gte
                | Self::Lt
                | Self::Lte
                | Self::Like
                | Self::Ilike
                | Self::Match
                | Self::Imatch
        )
    }

    /// Full-text operators take an optional `(config)` instead of a modifier.
    #[must_use]
    pub const fn is_text_search(self) -> bool {
        matches!(self, Self::Fts | Self::Plfts | Self::Phfts | Self::Wfts)
    }

    /// Operators whose operand is a pattern compiled at parse time.
    #[must_use]
    pub const fn is_pattern(self) -> bool {
        matches!(self, Self::Like | Self::Ilike | Self::Match | Self::Imatch)
    }
}

/// Range operators are part of the PostgREST grammar but have no client-side
/// evaluation here.
pub(crate) const UNSUPPORTED_OPERATORS: [&str; 5] = ["sl", "sr", "nxl", "nxr", "adj"];

///
/// Quantifier
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Quantifier {
    Any,
    All,
}

///
/// FilterPredicate
///
/// One leaf comparison. `patterns` holds the compiled form of pattern
/// operands (one per literal for quantified operators).
///

#[derive(Clone, Debug)]
pub struct FilterPredicate {
    pub path: String,
    pub operator: FilterOperator,
    pub quantifier: Option<Quantifier>,
    pub value: Value,
    pub negated: bool,
    pub(crate) patterns: Vec<Regex>,
}

impl FilterPredicate {
    /// Return true when this predicate pins its column to concrete values.
    #[must_use]
    pub const fn is_equality_class(&self) -> bool {
        match self.operator {
            FilterOperator::Eq => !matches!(self.quantifier, Some(Quantifier::All)),
            FilterOperator::In => true,
            _ => false,
        }
    }
}

impl PartialEq for FilterPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.operator == other.operator
            && self.quantifier == other.quantifier
            && self.value == other.value
            && self.negated == other.negated
    }
}

///
/// GroupKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GroupKind {
    And,
    Or,
}

///
/// FilterGroup
///

#[derive(Clone, Debug, PartialEq)]
pub struct FilterGroup {
    pub kind: GroupKind,
    pub negated: bool,
    pub children: Vec<FilterNode>,
}

impl FilterGroup {
    #[must_use]
    pub const fn and(children: Vec<FilterNode>) -> Self {
        Self {
            kind: GroupKind::And,
            negated: false,
            children,
        }
    }

    /// Keep only predicates accepted by `keep`.
    ///
    /// Removed predicates drop out of their group; a group left without
    /// children is removed from its parent. The root always survives and is
    /// vacuously true when emptied.
    #[must_use]
    pub(crate) fn retain_paths(&self, keep: &dyn Fn(&str) -> bool) -> Self {
        Self {
            kind: self.kind,
            negated: self.negated,
            children: self
                .children
                .iter()
                .filter_map(|child| child.retain_paths(keep))
                .collect(),
        }
    }

    /// Visit every predicate with its effective negation.
    pub(crate) fn walk<'a>(
        &'a self,
        negated: bool,
        f: &mut dyn FnMut(&'a FilterPredicate, bool),
    ) {
        let negated = negated ^ self.negated;
        for child in &self.children {
            match child {
                FilterNode::Predicate(pred) => f(pred, negated ^ pred.negated),
                FilterNode::Group(group) => group.walk(negated, f),
            }
        }
    }
}

///
/// FilterNode
///

#[derive(Clone, Debug, PartialEq)]
pub enum FilterNode {
    Predicate(FilterPredicate),
    Group(FilterGroup),
}

impl FilterNode {
    fn retain_paths(&self, keep: &dyn Fn(&str) -> bool) -> Option<Self> {
        match self {
            Self::Predicate(pred) => keep(&pred.path).then(|| self.clone()),
            Self::Group(group) => {
                let group = group.retain_paths(keep);
                (!group.children.is_empty()).then_some(Self::Group(group))
            }
        }
    }
}
