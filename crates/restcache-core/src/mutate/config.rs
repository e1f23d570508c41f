use crate::mutate::upsert::UpsertMutatorConfig;
use serde::{Deserialize, Serialize};

///
/// MalformedPolicy
///
/// What the planner does with a cached key whose filter or order string
/// cannot be parsed.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Replace the key's local transform with a revalidation.
    #[default]
    Revalidate,
    /// Leave the key untouched.
    Skip,
    /// Fail the whole call before any mutation is issued.
    Fail,
}

///
/// MutateConfig
///

#[derive(Clone, Debug, Default)]
pub struct MutateConfig {
    pub on_malformed: MalformedPolicy,
    pub upsert: UpsertMutatorConfig,
}

impl MutateConfig {
    #[must_use]
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    #[must_use]
    pub fn with_upsert(mut self, upsert: UpsertMutatorConfig) -> Self {
        self.upsert = upsert;
        self
    }
}
