use thiserror::Error as ThisError;

///
/// FilterParseError
///
/// Malformed or unsupported filter query strings.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum FilterParseError {
    #[error("filter on '{param}' has no operator")]
    MissingOperator { param: String },

    #[error("unknown filter operator '{token}' on '{path}'")]
    UnknownOperator { path: String, token: String },

    #[error("filter operator '{token}' on '{path}' is not supported for client-side evaluation")]
    UnsupportedOperator { path: String, token: String },

    #[error("operator '{token}' on '{path}' does not accept modifier '{modifier}'")]
    InvalidModifier {
        path: String,
        token: String,
        modifier: String,
    },

    #[error("invalid operand for '{token}' on '{path}': {reason}")]
    InvalidOperand {
        path: String,
        token: &'static str,
        reason: String,
    },

    #[error("malformed logical expression '{expression}': {reason}")]
    InvalidGroup { expression: String, reason: String },

    #[error("malformed select clause '{select}': {reason}")]
    InvalidSelect { select: String, reason: String },
}

impl FilterParseError {
    /// Return true when the query is well-formed but uses grammar that is
    /// deliberately not evaluated client-side.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperator { .. })
    }

    pub(crate) fn invalid_operand(
        path: &str,
        token: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOperand {
            path: path.to_string(),
            token,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_group(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidGroup {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}
