use restcache_core::{
    filter::{Filter, FilterMemo, FilterOptions, FilterParseError},
    key::{self, DecodedKey},
    mutate::{Cache, CacheError, CachedValue, MutatorFn, ShapeError},
};
use futures::{FutureExt, future::BoxFuture};
use serde_json::Value as JsonValue;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::trace;

///
/// MemoryCache
///
/// In-process cache keyed by encoded query keys. Mutators apply
/// immediately; a revalidation marks the entry stale and leaves its value
/// in place until the host refetches it.
///

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Entry>>,
    filters: FilterMemo,
    rejected: Mutex<BTreeSet<String>>,
}

#[derive(Debug)]
struct Entry {
    value: CachedValue,
    stale: bool,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh value under `key`, replacing any previous entry.
    pub fn insert(&self, key: impl Into<String>, value: CachedValue) {
        self.entries().insert(key.into(), Entry { value, stale: false });
    }

    /// Store a JSON response under `key`.
    pub fn insert_json(&self, key: impl Into<String>, value: JsonValue) -> Result<(), ShapeError> {
        let value = CachedValue::try_from(value)?;
        self.insert(key, value);

        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.entries().get(key).map(|entry| entry.value.clone())
    }

    #[must_use]
    pub fn get_json(&self, key: &str) -> Option<JsonValue> {
        self.get(key).map(JsonValue::from)
    }

    /// Return true when the entry was revalidated and not refreshed since.
    #[must_use]
    pub fn is_stale(&self, key: &str) -> bool {
        self.entries().get(key).is_some_and(|entry| entry.stale)
    }

    /// Keys currently marked stale.
    #[must_use]
    pub fn stale_keys(&self) -> Vec<String> {
        self.entries()
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn remove(&self, key: &str) -> Option<CachedValue> {
        self.entries().remove(key).map(|entry| entry.value)
    }

    /// Make every later mutation of `key` fail with [`CacheError::Rejected`].
    pub fn reject_mutations_for(&self, key: impl Into<String>) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Parsed filters memoized for this store.
    #[must_use]
    pub const fn filters(&self) -> &FilterMemo {
        &self.filters
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, key: &str, mutator: Option<MutatorFn>) -> Result<(), CacheError> {
        let rejected = self
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key);
        if rejected {
            return Err(CacheError::Rejected {
                key: key.to_string(),
                reason: "mutations rejected for this key".to_string(),
            });
        }

        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            trace!(target: "restcache::memory", key, "mutation of evicted key ignored");
            return Ok(());
        };

        match mutator {
            Some(mutator) => {
                let current = std::mem::replace(&mut entry.value, CachedValue::Row(None));
                entry.value = mutator(current);
            }
            None => {
                trace!(target: "restcache::memory", key, "marked stale");
                entry.stale = true;
            }
        }

        Ok(())
    }
}

impl Cache for MemoryCache {
    type Key = String;

    fn cache_keys(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    fn decode(&self, key: &String) -> Option<DecodedKey> {
        key::decode(key)
    }

    fn filter(
        &self,
        query_key: &str,
        options: &FilterOptions,
    ) -> Result<Arc<Filter>, FilterParseError> {
        self.filters.get_or_parse(query_key, options)
    }

    fn mutate(
        &self,
        key: &String,
        mutator: Option<MutatorFn>,
    ) -> BoxFuture<'_, Result<(), CacheError>> {
        let result = self.apply(key, mutator);

        futures::future::ready(result).boxed()
    }
}
