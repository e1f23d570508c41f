//! ## Crate layout
//! - `core`: key decoding, filter and order parsing, mutators, the mutation
//!   planner, and observability.
//! - `memory`: an in-process [`Cache`](core::mutate::Cache) store.
//!
//! The `prelude` module carries the vocabulary most callers need to plan
//! and apply a local write.

pub use restcache_core as core;

pub mod memory;

pub use restcache_core::{
    error::Error,
    mutate::{mutate, plan},
};
pub use memory::MemoryCache;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        filter::{Filter, FilterMemo, FilterOptions},
        key::{DecodedKey, KeyParts, decode, encode},
        mutate::{
            Cache, CachedValue, MalformedPolicy, MutateConfig, MutationSummary, Operation,
            RevalidateRelation, RevalidateTable, UpsertMutatorConfig, mutate, plan,
        },
        value::Row,
    };
    pub use crate::memory::MemoryCache;
}
