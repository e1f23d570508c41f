use crate::{
    filter::{Filter, FilterOptions, FilterParseError},
    key::DecodedKey,
    mutate::shape::{CachedValue, ShapeError},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// Pure transform applied by the cache to the value stored under one key.
pub type MutatorFn = Box<dyn Fn(CachedValue) -> CachedValue + Send + Sync>;

///
/// CacheError
///

#[derive(Debug, ThisError)]
pub enum CacheError {
    #[error("cache rejected mutation of '{key}': {reason}")]
    Rejected { key: String, reason: String },

    #[error("cached value under '{key}' has an unexpected shape: {source}")]
    Shape {
        key: String,
        #[source]
        source: ShapeError,
    },
}

///
/// Cache
///
/// The cache store as seen by the planner. Keys are opaque; the planner
/// only lists, decodes, and mutates them.
///
/// `mutate` with `None` revalidates the entry: it is marked stale and left
/// for the host to refetch.
///

pub trait Cache {
    type Key: Clone;

    /// Snapshot of the keys currently present.
    fn cache_keys(&self) -> Vec<Self::Key>;

    /// Decode a key; `None` when it is not a PostgREST query key.
    fn decode(&self, key: &Self::Key) -> Option<DecodedKey>;

    /// Return the parsed filter for a query key.
    ///
    /// Implementations may memoize through [`crate::filter::FilterMemo`].
    fn filter(
        &self,
        query_key: &str,
        options: &FilterOptions,
    ) -> Result<Arc<Filter>, FilterParseError> {
        Filter::parse(query_key, options).map(Arc::new)
    }

    fn mutate(
        &self,
        key: &Self::Key,
        mutator: Option<MutatorFn>,
    ) -> BoxFuture<'_, Result<(), CacheError>>;
}
