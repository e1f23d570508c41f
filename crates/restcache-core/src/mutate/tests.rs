use crate::{
    error::{ErrorClass, ErrorOrigin},
    filter::{Filter, FilterOptions},
    key::{self, DecodedKey, KeyParts},
    mutate::{
        Cache, CacheError, CachedValue, MalformedPolicy, MutateConfig, MutatorFn, Operation,
        RevalidateReason, RevalidateRelation, RevalidateTable, StepKind, UpsertMutatorConfig,
        UpsertQuery, build_delete_mutator_fn, build_upsert_mutator_fn, default_merge, mutate,
        plan,
    },
    obs::{metrics_report, metrics_reset_all},
    order::parse_order_by_key,
    value::Row,
};
use futures::{
    FutureExt,
    executor::block_on,
    future::{BoxFuture, ready},
};
use serde_json::{Value as JsonValue, json};
use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

// ---- helpers -----------------------------------------------------------

fn row(value: JsonValue) -> Row {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn rows(value: JsonValue) -> Vec<Row> {
    match value {
        JsonValue::Array(items) => items.into_iter().map(row).collect(),
        other => panic!("expected an array, got {other}"),
    }
}

fn posts_key(query: &str) -> String {
    key::encode(&KeyParts::new("public", "posts", query))
}

///
/// TestCache
///
/// Applies mutators synchronously and records revalidated keys.
///

#[derive(Default)]
struct TestCache {
    values: Mutex<BTreeMap<String, CachedValue>>,
    revalidated: Mutex<Vec<String>>,
    reject: Option<String>,
}

impl TestCache {
    fn with(entries: Vec<(String, CachedValue)>) -> Self {
        Self {
            values: Mutex::new(entries.into_iter().collect()),
            ..Self::default()
        }
    }

    fn get(&self, key: &str) -> CachedValue {
        self.values.lock().unwrap()[key].clone()
    }

    fn revalidated(&self) -> Vec<String> {
        self.revalidated.lock().unwrap().clone()
    }
}

impl Cache for TestCache {
    type Key = String;

    fn cache_keys(&self) -> Vec<String> {
        self.values.lock().unwrap().keys().cloned().collect()
    }

    fn decode(&self, key: &String) -> Option<DecodedKey> {
        key::decode(key)
    }

    fn mutate(
        &self,
        key: &String,
        mutator: Option<MutatorFn>,
    ) -> BoxFuture<'_, Result<(), CacheError>> {
        if self.reject.as_deref() == Some(key.as_str()) {
            return ready(Err(CacheError::Rejected {
                key: key.clone(),
                reason: "offline".to_string(),
            }))
            .boxed();
        }

        match mutator {
            Some(mutator) => {
                let mut values = self.values.lock().unwrap();
                if let Some(current) = values.remove(key) {
                    values.insert(key.clone(), mutator(current));
                }
            }
            None => self.revalidated.lock().unwrap().push(key.clone()),
        }

        ready(Ok(())).boxed()
    }
}

fn run(op: &Operation, cache: &TestCache) -> crate::mutate::MutationSummary {
    block_on(mutate(op, cache, &MutateConfig::default())).expect("mutation should succeed")
}

fn upsert_posts(input: JsonValue) -> Operation {
    Operation::upsert("public", "posts", row(input), ["id"])
}

fn delete_posts(input: JsonValue) -> Operation {
    Operation::delete("public", "posts", row(input), ["id"])
}

// ---- planner -----------------------------------------------------------

#[test]
fn upsert_updates_pinned_row_in_place() {
    let key = posts_key("id=eq.2");
    let cache = TestCache::with(vec![(
        key.clone(),
        CachedValue::Rows(rows(json!([{ "id": 2, "status": "open" }]))),
    )]);

    let summary = run(&upsert_posts(json!({ "id": 2, "status": "closed" })), &cache);

    assert_eq!(summary.upserts, 1);
    assert_eq!(
        cache.get(&key),
        CachedValue::Rows(rows(json!([{ "id": 2, "status": "closed" }])))
    );
}

#[test]
fn upsert_skips_queries_pinned_to_other_rows() {
    let key = posts_key("id=eq.3");
    let cache = TestCache::with(vec![(key, CachedValue::Rows(Vec::new()))]);

    let summary = run(&upsert_posts(json!({ "id": 2 })), &cache);

    assert_eq!(summary.keys_scanned, 1);
    assert_eq!(summary.total(), 0);
}

#[test]
fn upsert_evicts_past_limit_in_order() {
    let key = posts_key("order=created_at.desc&limit=2");
    let cache = TestCache::with(vec![(
        key.clone(),
        CachedValue::Rows(rows(json!([
            { "id": 3, "created_at": "2024-01-03T00:00:00Z" },
            { "id": 2, "created_at": "2024-01-02T00:00:00Z" },
        ]))),
    )]);

    run(
        &upsert_posts(json!({ "id": 4, "created_at": "2024-01-04T00:00:00Z" })),
        &cache,
    );
    assert_eq!(
        cache.get(&key),
        CachedValue::Rows(rows(json!([
            { "id": 4, "created_at": "2024-01-04T00:00:00Z" },
            { "id": 3, "created_at": "2024-01-03T00:00:00Z" },
        ])))
    );

    // older than the whole page: inserted then evicted again
    run(
        &upsert_posts(json!({ "id": 1, "created_at": "2024-01-01T00:00:00Z" })),
        &cache,
    );
    assert_eq!(cache.get(&key).row_count(), 2);
}

#[test]
fn update_moves_row_out_of_filtered_view() {
    let key = posts_key("status=eq.open");
    let cache = TestCache::with(vec![(
        key.clone(),
        CachedValue::Paginated {
            data: rows(json!([{ "id": 1, "status": "open" }, { "id": 2, "status": "open" }])),
            count: Some(2),
        },
    )]);

    run(&upsert_posts(json!({ "id": 1, "status": "closed" })), &cache);

    assert_eq!(
        cache.get(&key),
        CachedValue::Paginated {
            data: rows(json!([{ "id": 2, "status": "open" }])),
            count: Some(1),
        }
    );
}

#[test]
fn insert_bumps_count() {
    let key = posts_key("status=eq.open");
    let cache = TestCache::with(vec![(
        key.clone(),
        CachedValue::Paginated {
            data: Vec::new(),
            count: Some(7),
        },
    )]);

    run(&upsert_posts(json!({ "id": 9, "status": "open" })), &cache);

    let CachedValue::Paginated { data, count } = cache.get(&key) else {
        panic!("shape should be preserved");
    };
    assert_eq!(data.len(), 1);
    assert_eq!(count, Some(8));
}

#[test]
fn delete_removes_exactly_one_row() {
    let key = posts_key("");
    let cache = TestCache::with(vec![(
        key.clone(),
        CachedValue::Rows(rows(json!([{ "id": 1 }, { "id": 1 }, { "id": 2 }]))),
    )]);

    let summary = run(&delete_posts(json!({ "id": 1 })), &cache);

    assert_eq!(summary.deletes, 1);
    assert_eq!(
        cache.get(&key),
        CachedValue::Rows(rows(json!([{ "id": 1 }, { "id": 2 }])))
    );
}

#[test]
fn delete_without_primary_key_is_skipped() {
    metrics_reset_all();
    let key = posts_key("");
    let cache = TestCache::with(vec![(
        key.clone(),
        CachedValue::Rows(rows(json!([{ "id": 1 }]))),
    )]);

    let summary = run(&delete_posts(json!({ "title": "x" })), &cache);

    assert_eq!(summary.total(), 0);
    assert_eq!(cache.get(&key).row_count(), 1);
    assert_eq!(metrics_report().counters.ops.deletes_missing_pk, 1);
}

#[test]
fn relation_revalidation_follows_foreign_key() {
    let five = key::encode(&KeyParts::new("public", "authors", "id=eq.5"));
    let six = key::encode(&KeyParts::new("public", "authors", "id=eq.6"));
    let cache = TestCache::with(vec![
        (five.clone(), CachedValue::Rows(Vec::new())),
        (six, CachedValue::Rows(Vec::new())),
    ]);
    let op = upsert_posts(json!({ "id": 1, "author_id": 5 }))
        .revalidate_relation(RevalidateRelation::new("authors", "id", "author_id"));

    let summary = run(&op, &cache);

    assert_eq!(summary.revalidations, 1);
    assert_eq!(cache.revalidated(), vec![five]);
}

#[test]
fn relation_in_other_schema_is_ignored() {
    let five = key::encode(&KeyParts::new("public", "authors", "id=eq.5"));
    let cache = TestCache::with(vec![(five, CachedValue::Rows(Vec::new()))]);
    let op = upsert_posts(json!({ "id": 1, "author_id": 5 })).revalidate_relation(
        RevalidateRelation::new("authors", "id", "author_id").in_schema("private"),
    );

    assert_eq!(run(&op, &cache).revalidations, 0);
}

#[test]
fn table_revalidation_matches_schema_and_table() {
    let stats = key::encode(&KeyParts::new("public", "stats", "select=*"));
    let other = key::encode(&KeyParts::new("audit", "stats", "select=*"));
    let cache = TestCache::with(vec![
        (stats.clone(), CachedValue::Rows(Vec::new())),
        (other, CachedValue::Rows(Vec::new())),
    ]);
    let op = upsert_posts(json!({ "id": 1 }))
        .revalidate_table(RevalidateTable::new("stats").in_schema("public"));

    run(&op, &cache);

    assert_eq!(cache.revalidated(), vec![stats]);
}

#[test]
fn foreign_keys_are_skipped_entirely() {
    let cache = TestCache::with(vec![("swr-key".to_string(), CachedValue::Rows(Vec::new()))]);
    let op = upsert_posts(json!({ "id": 1 })).revalidate_table(RevalidateTable::new("posts"));

    let summary = run(&op, &cache);

    assert_eq!(summary.keys_scanned, 1);
    assert_eq!(summary.total(), 0);
}

#[test]
fn malformed_query_follows_policy() {
    let bad = posts_key("status=oops.open");
    let good = posts_key("");
    let entries = || {
        vec![
            (bad.clone(), CachedValue::Rows(Vec::new())),
            (good.clone(), CachedValue::Rows(Vec::new())),
        ]
    };
    let op = upsert_posts(json!({ "id": 1 }));

    let cache = TestCache::with(entries());
    let revalidate = plan(&op, &cache, &MutateConfig::default()).expect("plan should succeed");
    let bad_step = revalidate
        .steps()
        .iter()
        .find(|s| s.key == bad)
        .expect("bad key should be planned");
    assert_eq!(
        bad_step.kind,
        StepKind::Revalidate(RevalidateReason::MalformedQuery)
    );
    assert!(bad_step.mutator().is_none());

    let skip = plan(
        &op,
        &cache,
        &MutateConfig::default().with_malformed_policy(MalformedPolicy::Skip),
    )
    .expect("plan should succeed");
    assert_eq!(skip.len(), 1);
    assert_eq!(skip.steps()[0].key, good);

    let fail = TestCache::with(entries());
    let err = block_on(mutate(
        &op,
        &fail,
        &MutateConfig::default().with_malformed_policy(MalformedPolicy::Fail),
    ))
    .unwrap_err();
    assert_eq!(err.class, ErrorClass::Malformed);
    assert_eq!(err.origin, ErrorOrigin::Filter);
    // nothing was issued
    assert_eq!(fail.get(&good), CachedValue::Rows(Vec::new()));
}

#[test]
fn malformed_key_is_revalidated_once_even_when_table_matches() {
    let bad = posts_key("status=oops.open");
    let cache = TestCache::with(vec![(bad.clone(), CachedValue::Rows(Vec::new()))]);
    let op = upsert_posts(json!({ "id": 1 })).revalidate_table(RevalidateTable::new("posts"));

    let planned = plan(&op, &cache, &MutateConfig::default()).expect("plan should succeed");

    assert_eq!(planned.len(), 1);
    assert_eq!(
        planned.steps()[0].kind,
        StepKind::Revalidate(RevalidateReason::MalformedQuery)
    );
    assert_eq!(planned.summary().revalidations, 1);

    // skipping the primary transform leaves the table revalidation in place
    let skip = MutateConfig::default().with_malformed_policy(MalformedPolicy::Skip);
    let planned = plan(&op, &cache, &skip).expect("plan should succeed");
    assert_eq!(planned.len(), 1);
    assert_eq!(
        planned.steps()[0].kind,
        StepKind::Revalidate(RevalidateReason::Table)
    );
}

#[test]
fn malformed_order_is_malformed_too() {
    let bad = posts_key("order=created_at.sideways");
    let cache = TestCache::with(vec![(bad, CachedValue::Rows(Vec::new()))]);
    let config = MutateConfig::default().with_malformed_policy(MalformedPolicy::Fail);

    let err = plan(&upsert_posts(json!({ "id": 1 })), &cache, &config).unwrap_err();

    assert_eq!(err.origin, ErrorOrigin::Order);
}

#[test]
fn rejection_fails_fast() {
    let key = posts_key("");
    let mut cache = TestCache::with(vec![(key.clone(), CachedValue::Rows(Vec::new()))]);
    cache.reject = Some(key);

    let op = upsert_posts(json!({ "id": 1 }));
    let err = block_on(mutate(&op, &cache, &MutateConfig::default())).unwrap_err();

    assert!(err.is_cache_rejection());
    assert!(err.to_string().contains("offline"));
}

#[test]
fn failed_join_still_reports_planned_mutations() {
    metrics_reset_all();
    let rejected = posts_key("");
    let applied = posts_key("status=eq.open");
    let mut cache = TestCache::with(vec![
        (rejected.clone(), CachedValue::Rows(Vec::new())),
        (applied, CachedValue::Rows(Vec::new())),
    ]);
    cache.reject = Some(rejected);

    let op = upsert_posts(json!({ "id": 1, "status": "open" }));
    block_on(mutate(&op, &cache, &MutateConfig::default())).unwrap_err();

    let ops = metrics_report().counters.ops;
    assert_eq!(ops.mutations_planned, 2);
    assert_eq!(ops.mutate_failures, 1);
}

#[test]
fn empty_primary_keys_are_rejected() {
    let cache = TestCache::default();
    let op = Operation::upsert("public", "posts", Row::new(), Vec::<String>::new());

    let err = plan(&op, &cache, &MutateConfig::default()).unwrap_err();

    assert_eq!(err.origin, ErrorOrigin::Operation);
}

#[test]
fn planner_reports_metrics() {
    metrics_reset_all();
    let cache = TestCache::with(vec![
        (posts_key(""), CachedValue::Rows(Vec::new())),
        ("swr-key".to_string(), CachedValue::Rows(Vec::new())),
    ]);

    run(&upsert_posts(json!({ "id": 1 })), &cache);

    let ops = metrics_report().counters.ops;
    assert_eq!(ops.upsert_calls, 1);
    assert_eq!(ops.keys_scanned, 2);
    assert_eq!(ops.keys_undecodable, 1);
    assert_eq!(ops.upserts_scheduled, 1);
    assert_eq!(ops.mutations_planned, 1);
}

// ---- mutators ----------------------------------------------------------

fn open_filter() -> Arc<Filter> {
    Arc::new(
        Filter::parse("status=eq.open", &FilterOptions::default()).expect("query should parse"),
    )
}

#[test]
fn upsert_without_order_keeps_position_or_appends() {
    let mutator = build_upsert_mutator_fn(
        row(json!({ "id": 2, "status": "open", "title": "new" })),
        vec!["id".to_string()],
        open_filter(),
        UpsertQuery::default(),
        &UpsertMutatorConfig::default(),
    );
    let current = CachedValue::Rows(rows(json!([
        { "id": 1, "status": "open" },
        { "id": 2, "status": "open", "title": "old" },
        { "id": 3, "status": "open" },
    ])));

    let CachedValue::Rows(out) = mutator(current) else {
        panic!("shape should be preserved");
    };
    assert_eq!(out[1]["title"], json!("new"));

    let appended = mutator(CachedValue::Rows(rows(json!([{ "id": 1, "status": "open" }]))));
    let CachedValue::Rows(appended) = appended else {
        panic!("shape should be preserved");
    };
    assert_eq!(appended.len(), 2);
    assert_eq!(appended[1]["id"], json!(2));
}

#[test]
fn upsert_single_row_replaces_on_match_only() {
    let mutator = build_upsert_mutator_fn(
        row(json!({ "id": 1, "status": "open" })),
        vec!["id".to_string()],
        open_filter(),
        UpsertQuery::default(),
        &UpsertMutatorConfig::default(),
    );

    assert_eq!(
        mutator(CachedValue::Row(Some(row(json!({ "id": 1, "status": "draft", "n": 1 }))))),
        CachedValue::Row(Some(row(json!({ "id": 1, "status": "open", "n": 1 }))))
    );
    assert_eq!(
        mutator(CachedValue::Row(Some(row(json!({ "id": 2 }))))),
        CachedValue::Row(Some(row(json!({ "id": 2 }))))
    );
    assert_eq!(mutator(CachedValue::Row(None)), CachedValue::Row(None));
}

#[test]
fn upsert_rechunks_pages() {
    let mutator = build_upsert_mutator_fn(
        row(json!({ "id": 0, "rank": 0 })),
        vec!["id".to_string()],
        Arc::new(Filter::parse("", &FilterOptions::default()).expect("query should parse")),
        UpsertQuery {
            limit: NonZeroUsize::new(2),
            order_by: Some(parse_order_by_key("rank").expect("order should parse")),
        },
        &UpsertMutatorConfig::default(),
    );
    let pages = CachedValue::Pages(vec![
        rows(json!([{ "id": 1, "rank": 1 }, { "id": 2, "rank": 2 }])),
        rows(json!([{ "id": 3, "rank": 3 }])),
    ]);

    assert_eq!(
        mutator(pages),
        CachedValue::Pages(vec![
            rows(json!([{ "id": 0, "rank": 0 }, { "id": 1, "rank": 1 }])),
            rows(json!([{ "id": 2, "rank": 2 }, { "id": 3, "rank": 3 }])),
        ])
    );
}

#[test]
fn custom_merge_replaces_default() {
    let config = UpsertMutatorConfig::with_merge(|_existing, input| input.clone());
    let mutator = build_upsert_mutator_fn(
        row(json!({ "id": 1, "status": "open" })),
        vec!["id".to_string()],
        open_filter(),
        UpsertQuery::default(),
        &config,
    );

    let out = mutator(CachedValue::Rows(rows(json!([
        { "id": 1, "status": "open", "extra": true },
    ]))));

    assert_eq!(out, CachedValue::Rows(rows(json!([{ "id": 1, "status": "open" }]))));
}

#[test]
fn default_merge_is_deep() {
    let merged = default_merge(
        &row(json!({ "id": 1, "meta": { "a": 1, "b": 2 }, "tags": [1, 2] })),
        &row(json!({ "meta": { "b": 3 }, "tags": [3] })),
    );

    assert_eq!(
        JsonValue::Object(merged),
        json!({ "id": 1, "meta": { "a": 1, "b": 3 }, "tags": [3] })
    );
}

#[test]
fn delete_handles_every_shape() {
    let mutator = build_delete_mutator_fn(row(json!({ "id": 1 })), vec!["id".to_string()]);

    assert_eq!(
        mutator(CachedValue::Row(Some(row(json!({ "id": 1 }))))),
        CachedValue::Row(None)
    );
    assert_eq!(
        mutator(CachedValue::Paginated {
            data: rows(json!([{ "id": 2 }])),
            count: Some(5),
        }),
        CachedValue::Paginated {
            data: rows(json!([{ "id": 2 }])),
            count: Some(5),
        }
    );
    assert_eq!(
        mutator(CachedValue::Paginated {
            data: rows(json!([{ "id": 1 }])),
            count: Some(5),
        }),
        CachedValue::Paginated {
            data: Vec::new(),
            count: Some(4),
        }
    );
    assert_eq!(
        mutator(CachedValue::Pages(vec![
            rows(json!([{ "id": 2 }])),
            rows(json!([{ "id": 1 }, { "id": 1 }])),
        ])),
        CachedValue::Pages(vec![rows(json!([{ "id": 2 }])), rows(json!([{ "id": 1 }]))])
    );
}

#[test]
fn large_integer_keys_match_exactly() {
    let cached = || {
        CachedValue::Rows(rows(json!([
            { "id": 9_007_199_254_740_992_u64, "status": "open", "title": "low" },
            { "id": 9_007_199_254_740_993_u64, "status": "open", "title": "high" },
        ])))
    };

    let delete = build_delete_mutator_fn(
        row(json!({ "id": 9_007_199_254_740_993_u64 })),
        vec!["id".to_string()],
    );
    assert_eq!(
        delete(cached()),
        CachedValue::Rows(rows(json!([
            { "id": 9_007_199_254_740_992_u64, "status": "open", "title": "low" },
        ])))
    );

    let upsert = build_upsert_mutator_fn(
        row(json!({ "id": 9_007_199_254_740_993_u64, "status": "open", "title": "renamed" })),
        vec!["id".to_string()],
        open_filter(),
        UpsertQuery::default(),
        &UpsertMutatorConfig::default(),
    );
    assert_eq!(
        upsert(cached()),
        CachedValue::Rows(rows(json!([
            { "id": 9_007_199_254_740_992_u64, "status": "open", "title": "low" },
            { "id": 9_007_199_254_740_993_u64, "status": "open", "title": "renamed" },
        ])))
    );
}

// ---- shapes ------------------------------------------------------------

#[test]
fn cached_value_shapes_from_json() {
    assert_eq!(CachedValue::try_from(JsonValue::Null), Ok(CachedValue::Row(None)));
    assert_eq!(
        CachedValue::try_from(json!({ "id": 1 })),
        Ok(CachedValue::Row(Some(row(json!({ "id": 1 })))))
    );
    assert_eq!(
        CachedValue::try_from(json!({ "data": [{ "id": 1 }], "count": 10 })),
        Ok(CachedValue::Paginated {
            data: rows(json!([{ "id": 1 }])),
            count: Some(10),
        })
    );
    assert_eq!(
        CachedValue::try_from(json!([[{ "id": 1 }], []])),
        Ok(CachedValue::Pages(vec![rows(json!([{ "id": 1 }])), Vec::new()]))
    );
    assert!(CachedValue::try_from(json!([1, 2])).is_err());
    assert!(CachedValue::try_from(json!("text")).is_err());

    // a row that merely has a `data` column stays a row
    assert!(matches!(
        CachedValue::try_from(json!({ "data": [], "id": 1 })),
        Ok(CachedValue::Row(Some(_)))
    ));
}
