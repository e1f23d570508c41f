use crate::{filter::FilterParseError, mutate::CacheError, order::OrderParseError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured planner error with a stable classification.
/// `detail` carries the boundary error that produced it; its variant always
/// corresponds to `origin`.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct Error {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
    pub detail: Option<ErrorDetail>,
}

impl Error {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Return true when the failure came from a rejected cache mutation.
    #[must_use]
    pub const fn is_cache_rejection(&self) -> bool {
        matches!(self.class, ErrorClass::Cache)
    }

    /// Return true when the failure came from a malformed query or order string.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self.class, ErrorClass::Malformed | ErrorClass::Unsupported)
    }
}

impl From<FilterParseError> for Error {
    fn from(err: FilterParseError) -> Self {
        let class = if err.is_unsupported() {
            ErrorClass::Unsupported
        } else {
            ErrorClass::Malformed
        };

        Self::new(class, ErrorOrigin::Filter, err.to_string()).with_detail(ErrorDetail::Filter(err))
    }
}

impl From<OrderParseError> for Error {
    fn from(err: OrderParseError) -> Self {
        Self::new(ErrorClass::Malformed, ErrorOrigin::Order, err.to_string())
            .with_detail(ErrorDetail::Order(err))
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Self::new(ErrorClass::Cache, ErrorOrigin::Cache, err.to_string())
            .with_detail(ErrorDetail::Cache(err))
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Malformed,
    Unsupported,
    Cache,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Malformed => "malformed",
            Self::Unsupported => "unsupported",
            Self::Cache => "cache",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Filter,
    Order,
    Operation,
    Cache,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Filter => "filter",
            Self::Order => "order",
            Self::Operation => "operation",
            Self::Cache => "cache",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorDetail
///
/// Boundary error preserved alongside the classified [`Error`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Filter(FilterParseError),

    #[error("{0}")]
    Order(OrderParseError),

    #[error("{0}")]
    Cache(CacheError),
}

///
/// TESTS
///
