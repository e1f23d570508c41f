//! Core engine for restcache: cache-key decoding, PostgREST filter and order
//! parsing, cached-value mutators, and the mutation planner that keeps cached
//! query results consistent with local writes.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod error;
pub mod filter;
pub mod key;
pub mod mutate;
pub mod obs;
pub mod order;
pub mod value;

///
/// CONSTANTS
///

/// Prefix shared by every cache key produced by [`key::encode`].
pub const KEY_PREFIX: &str = "postgrest";

/// Separator between the segments of an encoded cache key.
pub const KEY_SEPARATOR: char = '$';

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, sinks, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        filter::{Filter, FilterOptions},
        key::DecodedKey,
        mutate::{
            Cache, CachedValue, MutateConfig, Operation, OperationKind, RevalidateRelation,
            RevalidateTable,
        },
        order::OrderSpec,
        value::{Row, Value},
    };
}
