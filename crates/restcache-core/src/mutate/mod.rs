//! Mutation planning: match one written row against every cached query
//! and derive the transform or revalidation each cached entry needs.

mod cache;
mod config;
mod delete;
mod shape;
mod upsert;

#[cfg(test)]
mod tests;

pub use cache::{Cache, CacheError, MutatorFn};
pub use config::{MalformedPolicy, MutateConfig};
pub use delete::build_delete_mutator_fn;
pub use shape::{CachedValue, ShapeError};
pub use upsert::{
    MergeFn, UpsertMutatorConfig, UpsertQuery, build_upsert_mutator_fn, default_merge,
};

use crate::{
    error::{Error, ErrorClass, ErrorOrigin},
    filter::FilterOptions,
    key::DecodedKey,
    obs::{MetricsEvent, ScheduleKind, sink::record},
    order::parse_order_by_key,
    value::{Row, lookup},
};
use futures::future::try_join_all;
use std::fmt;
use tracing::{debug, trace};

///
/// OperationKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationKind {
    Upsert,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        };
        write!(f, "{label}")
    }
}

///
/// RevalidateRelation
///
/// Revalidate cached queries on `relation` whose filter on
/// `relation_id_column` accepts the written row's `fkey_column` value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RevalidateRelation {
    pub relation: String,
    pub relation_id_column: String,
    pub fkey_column: String,
    pub schema: Option<String>,
}

impl RevalidateRelation {
    #[must_use]
    pub fn new(
        relation: impl Into<String>,
        relation_id_column: impl Into<String>,
        fkey_column: impl Into<String>,
    ) -> Self {
        Self {
            relation: relation.into(),
            relation_id_column: relation_id_column.into(),
            fkey_column: fkey_column.into(),
            schema: None,
        }
    }

    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

///
/// RevalidateTable
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RevalidateTable {
    pub table: String,
    pub schema: Option<String>,
}

impl RevalidateTable {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
        }
    }

    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

///
/// MutatorOpts
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MutatorOpts {
    pub revalidate_relations: Vec<RevalidateRelation>,
    pub revalidate_tables: Vec<RevalidateTable>,
}

///
/// Operation
///
/// One local write. `primary_keys` must name at least one column.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub schema: String,
    pub table: String,
    pub input: Row,
    pub kind: OperationKind,
    pub primary_keys: Vec<String>,
    pub opts: MutatorOpts,
}

impl Operation {
    #[must_use]
    pub fn upsert<I, S>(
        schema: impl Into<String>,
        table: impl Into<String>,
        input: Row,
        primary_keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(OperationKind::Upsert, schema, table, input, primary_keys)
    }

    #[must_use]
    pub fn delete<I, S>(
        schema: impl Into<String>,
        table: impl Into<String>,
        input: Row,
        primary_keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(OperationKind::Delete, schema, table, input, primary_keys)
    }

    fn new<I, S>(
        kind: OperationKind,
        schema: impl Into<String>,
        table: impl Into<String>,
        input: Row,
        primary_keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into(),
            table: table.into(),
            input,
            kind,
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
            opts: MutatorOpts::default(),
        }
    }

    #[must_use]
    pub fn revalidate_relation(mut self, relation: RevalidateRelation) -> Self {
        self.opts.revalidate_relations.push(relation);
        self
    }

    #[must_use]
    pub fn revalidate_table(mut self, table: RevalidateTable) -> Self {
        self.opts.revalidate_tables.push(table);
        self
    }

    fn targets(&self, key: &DecodedKey) -> bool {
        key.schema == self.schema && key.table == self.table
    }
}

///
/// StepKind
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StepKind {
    Upsert,
    Delete,
    Revalidate(RevalidateReason),
}

impl StepKind {
    const fn schedule_kind(&self) -> ScheduleKind {
        match self {
            Self::Upsert => ScheduleKind::Upsert,
            Self::Delete => ScheduleKind::Delete,
            Self::Revalidate(_) => ScheduleKind::Revalidate,
        }
    }
}

///
/// RevalidateReason
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RevalidateReason {
    /// The key's filter or order string could not be parsed.
    MalformedQuery,
    /// A relation whose filter accepts the written foreign key.
    Relation(String),
    Table,
}

///
/// PlannedMutation
///

pub struct PlannedMutation<K> {
    pub key: K,
    pub kind: StepKind,
    mutator: Option<MutatorFn>,
}

impl<K> PlannedMutation<K> {
    /// The transform to apply; `None` for revalidations.
    #[must_use]
    pub fn mutator(&self) -> Option<&MutatorFn> {
        self.mutator.as_ref()
    }

    #[must_use]
    pub fn into_parts(self) -> (K, Option<MutatorFn>) {
        (self.key, self.mutator)
    }
}

impl<K: fmt::Debug> fmt::Debug for PlannedMutation<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedMutation")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

///
/// MutationSummary
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MutationSummary {
    pub keys_scanned: usize,
    pub upserts: usize,
    pub deletes: usize,
    pub revalidations: usize,
}

impl MutationSummary {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.upserts + self.deletes + self.revalidations
    }
}

///
/// MutationPlan
///

#[derive(Debug)]
pub struct MutationPlan<K> {
    steps: Vec<PlannedMutation<K>>,
    keys_scanned: usize,
}

impl<K> MutationPlan<K> {
    #[must_use]
    pub fn steps(&self) -> &[PlannedMutation<K>] {
        &self.steps
    }

    #[must_use]
    pub fn into_steps(self) -> Vec<PlannedMutation<K>> {
        self.steps
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> MutationSummary {
        let mut summary = MutationSummary {
            keys_scanned: self.keys_scanned,
            ..MutationSummary::default()
        };
        for step in &self.steps {
            match step.kind {
                StepKind::Upsert => summary.upserts += 1,
                StepKind::Delete => summary.deletes += 1,
                StepKind::Revalidate(_) => summary.revalidations += 1,
            }
        }

        summary
    }
}

///
/// Planning
///

/// Decide, for every key currently in the cache, what the write means for it.
///
/// Planning is synchronous and issues nothing; see [`mutate`].
pub fn plan<C>(
    op: &Operation,
    cache: &C,
    config: &MutateConfig,
) -> Result<MutationPlan<C::Key>, Error>
where
    C: Cache + ?Sized,
{
    if op.primary_keys.is_empty() {
        return Err(Error::new(
            ErrorClass::Malformed,
            ErrorOrigin::Operation,
            format!("{} on '{}.{}' names no primary key", op.kind, op.schema, op.table),
        ));
    }

    let mut planner = Planner {
        op,
        cache,
        config,
        steps: Vec::new(),
    };
    let mut keys_scanned = 0;

    for key in cache.cache_keys() {
        keys_scanned += 1;
        let decoded = cache.decode(&key);
        record(MetricsEvent::KeyScanned {
            decoded: decoded.is_some(),
        });

        // not a query key: nothing else to do, including revalidation
        let Some(decoded) = decoded else {
            continue;
        };

        planner.plan_key(&key, &decoded)?;
    }

    Ok(MutationPlan {
        steps: planner.steps,
        keys_scanned,
    })
}

/// Plan the write, issue every mutation concurrently, and wait for all of
/// them. The first rejected mutation fails the call.
pub async fn mutate<C>(
    op: &Operation,
    cache: &C,
    config: &MutateConfig,
) -> Result<MutationSummary, Error>
where
    C: Cache + ?Sized,
{
    record(MetricsEvent::MutateStart {
        kind: op.kind,
        table: &op.table,
    });

    let plan = match plan(op, cache, config) {
        Ok(plan) => plan,
        Err(err) => {
            record_finish(op, 0, true);
            return Err(err);
        }
    };
    let summary = plan.summary();

    debug!(
        target: "restcache::mutate",
        kind = %op.kind,
        table = %op.table,
        keys = summary.keys_scanned,
        mutations = summary.total(),
        "issuing planned mutations"
    );

    let pending = plan.into_steps().into_iter().map(|step| {
        let (key, mutator) = step.into_parts();
        cache.mutate(&key, mutator)
    });
    let result = try_join_all(pending).await;
    let planned = u64::try_from(summary.total()).unwrap_or(u64::MAX);
    record_finish(op, planned, result.is_err());
    result?;

    Ok(summary)
}

fn record_finish(op: &Operation, planned: u64, failed: bool) {
    record(MetricsEvent::MutateFinish {
        kind: op.kind,
        table: &op.table,
        planned,
        failed,
    });
}

///
/// Planner
///

struct Planner<'a, C: Cache + ?Sized> {
    op: &'a Operation,
    cache: &'a C,
    config: &'a MutateConfig,
    steps: Vec<PlannedMutation<C::Key>>,
}

impl<C: Cache + ?Sized> Planner<'_, C> {
    fn plan_key(&mut self, key: &C::Key, decoded: &DecodedKey) -> Result<(), Error> {
        let op = self.op;
        let mut malformed = false;

        if op.targets(decoded) {
            let primary = match op.kind {
                OperationKind::Upsert => self.plan_upsert(decoded),
                OperationKind::Delete => Ok(self.plan_delete(decoded)),
            };
            match primary {
                Ok(Some((kind, mutator))) => self.push(key, decoded, kind, Some(mutator)),
                Ok(None) => {}
                Err(err) => malformed = self.on_malformed(key, decoded, err, malformed)?,
            }
        }

        for relation in &op.opts.revalidate_relations {
            match self.relation_matches(relation, decoded) {
                Ok(true) => self.push(
                    key,
                    decoded,
                    StepKind::Revalidate(RevalidateReason::Relation(relation.relation.clone())),
                    None,
                ),
                Ok(false) => {}
                Err(err) => malformed = self.on_malformed(key, decoded, err, malformed)?,
            }
        }

        // a malformed revalidation already covers this key
        let table_match = op.opts.revalidate_tables.iter().any(|t| {
            t.schema.as_ref().is_none_or(|s| *s == decoded.schema) && t.table == decoded.table
        });
        if table_match && !malformed {
            self.push(key, decoded, StepKind::Revalidate(RevalidateReason::Table), None);
        }

        Ok(())
    }

    fn plan_upsert(&self, decoded: &DecodedKey) -> Result<Option<(StepKind, MutatorFn)>, Error> {
        let filter = self
            .cache
            .filter(&decoded.query_key, &FilterOptions::default())?;
        let input = filter.denormalize(&self.op.input);
        let pks = &self.op.primary_keys;

        let affected = filter.apply_filters(&input)
            || !filter.has_filters_on_paths(pks)
            || filter.apply_filters_on_paths(&input, pks);
        if !affected {
            trace!(
                target: "restcache::mutate",
                table = %decoded.table,
                query = %decoded.query_key,
                "upsert does not reach cached query"
            );
            return Ok(None);
        }

        let order_by = decoded
            .order_by_key
            .as_deref()
            .map(parse_order_by_key)
            .transpose()?;
        let query = UpsertQuery {
            limit: decoded.limit,
            order_by,
        };
        let mutator =
            build_upsert_mutator_fn(input, pks.clone(), filter, query, &self.config.upsert);

        Ok(Some((StepKind::Upsert, mutator)))
    }

    fn plan_delete(&self, decoded: &DecodedKey) -> Option<(StepKind, MutatorFn)> {
        let missing: Vec<&str> = self
            .op
            .primary_keys
            .iter()
            .filter(|pk| !self.op.input.contains_key(pk.as_str()))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            debug!(
                target: "restcache::mutate",
                table = %decoded.table,
                query = %decoded.query_key,
                missing = ?missing,
                "delete input lacks primary key values; key skipped"
            );
            record(MetricsEvent::DeleteMissingPrimaryKey {
                table: &decoded.table,
            });
            return None;
        }

        let mutator = build_delete_mutator_fn(self.op.input.clone(), self.op.primary_keys.clone());

        Some((StepKind::Delete, mutator))
    }

    fn relation_matches(
        &self,
        relation: &RevalidateRelation,
        decoded: &DecodedKey,
    ) -> Result<bool, Error> {
        let schema_match = relation
            .schema
            .as_ref()
            .is_none_or(|s| *s == decoded.schema);
        if !schema_match || relation.relation != decoded.table {
            return Ok(false);
        }

        let filter = self.cache.filter(
            &decoded.query_key,
            &FilterOptions::exclusive([relation.relation_id_column.as_str()]),
        )?;

        let mut probe = Row::new();
        if let Some(value) = lookup(&self.op.input, &relation.fkey_column) {
            probe.insert(relation.relation_id_column.clone(), value.clone());
        }

        Ok(filter.apply_filters(&probe))
    }

    // Apply the malformed-key policy. Returns whether a malformed
    // revalidation is now scheduled for this key.
    fn on_malformed(
        &mut self,
        key: &C::Key,
        decoded: &DecodedKey,
        err: Error,
        already_revalidated: bool,
    ) -> Result<bool, Error> {
        record(MetricsEvent::MalformedQuery {
            table: &decoded.table,
        });

        match self.config.on_malformed {
            MalformedPolicy::Fail => Err(err),
            MalformedPolicy::Skip => {
                debug!(
                    target: "restcache::mutate",
                    table = %decoded.table,
                    query = %decoded.query_key,
                    error = %err,
                    "malformed cached query skipped"
                );
                Ok(already_revalidated)
            }
            MalformedPolicy::Revalidate => {
                debug!(
                    target: "restcache::mutate",
                    table = %decoded.table,
                    query = %decoded.query_key,
                    error = %err,
                    "malformed cached query revalidated"
                );
                if !already_revalidated {
                    self.push(
                        key,
                        decoded,
                        StepKind::Revalidate(RevalidateReason::MalformedQuery),
                        None,
                    );
                }
                Ok(true)
            }
        }
    }

    fn push(
        &mut self,
        key: &C::Key,
        decoded: &DecodedKey,
        kind: StepKind,
        mutator: Option<MutatorFn>,
    ) {
        record(MetricsEvent::Scheduled {
            kind: kind.schedule_kind(),
            table: &decoded.table,
        });
        trace!(
            target: "restcache::mutate",
            table = %decoded.table,
            query = %decoded.query_key,
            step = ?kind,
            "scheduled"
        );

        self.steps.push(PlannedMutation {
            key: key.clone(),
            kind,
            mutator,
        });
    }
}
