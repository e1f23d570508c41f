use crate::filter::{Filter, FilterOptions, FilterParseError};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

///
/// FilterMemo
///
/// Parsed filters keyed by `(query_key, options)`.
/// Parsing is pure, so a poisoned lock is recovered rather than reported.
///

#[derive(Debug, Default)]
pub struct FilterMemo {
    entries: Mutex<HashMap<(String, FilterOptions), Arc<Filter>>>,
}

impl FilterMemo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized filter, parsing and storing it on first use.
    /// Parse failures are not cached.
    pub fn get_or_parse(
        &self,
        query_key: &str,
        options: &FilterOptions,
    ) -> Result<Arc<Filter>, FilterParseError> {
        let memo_key = (query_key.to_string(), options.clone());
        if let Some(filter) = self.lock().get(&memo_key) {
            return Ok(Arc::clone(filter));
        }

        let filter = Arc::new(Filter::parse(query_key, options)?);
        let stored = self
            .lock()
            .entry(memo_key)
            .or_insert_with(|| Arc::clone(&filter))
            .clone();

        Ok(stored)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, FilterOptions), Arc<Filter>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
