
use crate::filter::{
    Filter, FilterMemo, FilterNode, FilterOperator, FilterOptions, FilterParseError, GroupKind,
    Quantifier,
};
use crate::value::{Row, Value};
use serde_json::json;

fn filter(query: &str) -> Filter {
    Filter::parse(query, &FilterOptions::default()).expect("query should parse")
}

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

// ---- parsing -----------------------------------------------------------

#[test]
fn reserved_params_are_not_filters() {
    let f = filter("select=id,name&order=id.desc&limit=10&offset=5&author.order=name&status=eq.open");

    assert_eq!(f.root().children.len(), 1);
    assert!(f.has_paths(&["status"]));
    assert!(!f.has_paths(&["order"]));
}

#[test]
fn predicate_shape_is_parsed() {
    let f = filter("age=not.gte.18");
    let FilterNode::Predicate(pred) = &f.root().children[0] else {
        panic!("expected a predicate");
    };

    assert_eq!(pred.path, "age");
    assert_eq!(pred.operator, FilterOperator::Gte);
    assert!(pred.negated);
    assert_eq!(pred.value, Value::Integer(18));
}

#[test]
fn quantified_operators_take_brace_lists() {
    let f = filter("tag=like(any).{a*,b*}");
    let FilterNode::Predicate(pred) = &f.root().children[0] else {
        panic!("expected a predicate");
    };

    assert_eq!(pred.quantifier, Some(Quantifier::Any));
    assert_eq!(
        pred.value,
        Value::List(vec![Value::from("a*"), Value::from("b*")])
    );
}

#[test]
fn logical_groups_nest() {
    let f = filter("or=(age.lt.18,and(age.gt.65,retired.is.true))&not.and=(a.eq.1,b.eq.2)");
    let FilterNode::Group(or) = &f.root().children[0] else {
        panic!("expected a group");
    };
    let FilterNode::Group(not_and) = &f.root().children[1] else {
        panic!("expected a group");
    };

    assert_eq!(or.kind, GroupKind::Or);
    assert_eq!(or.children.len(), 2);
    assert!(not_and.negated);
    assert!(f.has_paths(&["age", "retired", "a", "b"]));
}

#[test]
fn embedded_logical_groups_prefix_their_paths() {
    let f = filter("author.or=(name.eq.ann,name.eq.bob)");

    assert!(f.has_paths(&["author.name"]));
}

#[test]
fn quoted_values_keep_separators() {
    let f = filter(r#"name=in.("a,b",c)"#);

    assert!(f.apply_filters(&row(json!({ "name": "a,b" }))));
    assert!(f.apply_filters(&row(json!({ "name": "c" }))));
    assert!(!f.apply_filters(&row(json!({ "name": "a" }))));
}

#[test]
fn malformed_queries_are_rejected() {
    let opts = FilterOptions::default();

    assert!(matches!(
        Filter::parse("status=open", &opts),
        Err(FilterParseError::MissingOperator { .. })
    ));
    assert!(matches!(
        Filter::parse("status=equals.open", &opts),
        Err(FilterParseError::UnknownOperator { .. })
    ));
    assert!(matches!(
        Filter::parse("age=neq(any).{1,2}", &opts),
        Err(FilterParseError::InvalidModifier { .. })
    ));
    assert!(matches!(
        Filter::parse("or=(a.eq.1,b.eq.2", &opts),
        Err(FilterParseError::InvalidGroup { .. })
    ));
    assert!(matches!(
        Filter::parse("flag=is.maybe", &opts),
        Err(FilterParseError::InvalidOperand { .. })
    ));
}

#[test]
fn range_operators_are_unsupported() {
    let err = Filter::parse("during=sl.[1,10)", &FilterOptions::default()).unwrap_err();

    assert!(err.is_unsupported());
}

// ---- evaluation --------------------------------------------------------

#[test]
fn comparisons_follow_three_valued_logic() {
    let f = filter("age=gt.18");

    assert!(f.apply_filters(&row(json!({ "age": 30 }))));
    assert!(!f.apply_filters(&row(json!({ "age": 10 }))));
    assert!(!f.apply_filters(&row(json!({ "age": null }))));
    assert!(!f.apply_filters(&row(json!({}))));

    // not(unknown) is still unknown
    let negated = filter("age=not.gt.18");
    assert!(negated.apply_filters(&row(json!({ "age": 10 }))));
    assert!(!negated.apply_filters(&row(json!({}))));
}

#[test]
fn is_null_matches_missing_and_null() {
    let f = filter("deleted_at=is.null");

    assert!(f.apply_filters(&row(json!({}))));
    assert!(f.apply_filters(&row(json!({ "deleted_at": null }))));
    assert!(!f.apply_filters(&row(json!({ "deleted_at": "2024-01-01T00:00:00Z" }))));

    let not_null = filter("deleted_at=not.is.null");
    assert!(!not_null.apply_filters(&row(json!({}))));
}

#[test]
fn or_with_unknown_branch_can_still_match() {
    let f = filter("or=(age.lt.18,status.eq.vip)");

    assert!(f.apply_filters(&row(json!({ "status": "vip" }))));
    assert!(!f.apply_filters(&row(json!({ "status": "basic" }))));
}

#[test]
fn is_distinct_is_null_safe() {
    let f = filter("owner=isdistinct.null");

    assert!(f.apply_filters(&row(json!({ "owner": 1 }))));
    assert!(!f.apply_filters(&row(json!({}))));
}

#[test]
fn dates_compare_by_instant() {
    let f = filter("created_at=gte.2024-01-01T00:00:00Z");

    assert!(f.apply_filters(&row(json!({ "created_at": "2024-01-01T02:00:00+02:00" }))));
    assert!(!f.apply_filters(&row(json!({ "created_at": "2023-12-31T23:59:59Z" }))));
}

#[test]
fn numbers_compare_numerically() {
    let f = filter("score=eq.1");

    assert!(f.apply_filters(&row(json!({ "score": 1.0 }))));
    assert!(f.apply_filters(&row(json!({ "score": "1" }))));
}

#[test]
fn bigint_equality_is_exact() {
    let f = filter("id=in.(9007199254740993,7)");

    assert!(f.apply_filters(&row(json!({ "id": 9_007_199_254_740_993_u64 }))));
    assert!(!f.apply_filters(&row(json!({ "id": 9_007_199_254_740_992_u64 }))));

    let exact = filter("id=eq.9007199254740993");
    assert!(!exact.apply_filters(&row(json!({ "id": "9007199254740992" }))));
}

#[test]
fn like_and_ilike_patterns() {
    assert!(filter("name=like.*son").apply_filters(&row(json!({ "name": "Jackson" }))));
    assert!(!filter("name=like.*SON").apply_filters(&row(json!({ "name": "Jackson" }))));
    assert!(filter("name=ilike.*SON").apply_filters(&row(json!({ "name": "Jackson" }))));
    assert!(filter("code=like.a_c").apply_filters(&row(json!({ "code": "abc" }))));
    assert!(filter("name=imatch.^ja").apply_filters(&row(json!({ "name": "Jackson" }))));
}

#[test]
fn quantifiers_reduce_over_the_list() {
    let any = filter("age=gt(any).{50,10}");
    let all = filter("age=gt(all).{50,10}");
    let r = row(json!({ "age": 20 }));

    assert!(any.apply_filters(&r));
    assert!(!all.apply_filters(&r));
}

#[test]
fn containment_operators() {
    let tags = row(json!({ "tags": ["a", "b", "c"], "meta": { "k": 1, "x": { "y": 2 } } }));

    assert!(filter("tags=cs.{a,b}").apply_filters(&tags));
    assert!(!filter("tags=cs.{a,z}").apply_filters(&tags));
    assert!(filter("tags=cd.{a,b,c,d}").apply_filters(&tags));
    assert!(filter("tags=ov.{z,c}").apply_filters(&tags));
    assert!(filter(r#"meta=cs.{"x":{"y":2}}"#).apply_filters(&tags));
    assert!(!filter(r#"meta=cs.{"k":2}"#).apply_filters(&tags));
}

#[test]
fn text_search_operators() {
    let doc = row(json!({ "body": "The quick brown fox jumps" }));

    assert!(filter("body=fts.quick%26fox").apply_filters(&doc));
    assert!(filter("body=fts(english).cat | fox").apply_filters(&doc));
    assert!(!filter("body=fts.quick%26!fox").apply_filters(&doc));
    assert!(filter("body=fts.jum:*").apply_filters(&doc));
    assert!(filter("body=plfts.fox quick").apply_filters(&doc));
    assert!(filter("body=phfts.brown fox").apply_filters(&doc));
    assert!(!filter("body=phfts.fox brown").apply_filters(&doc));
    assert!(filter(r#"body=wfts."quick brown" -cat"#).apply_filters(&doc));
    assert!(filter("body=wfts.cat or fox").apply_filters(&doc));
}

#[test]
fn nested_paths_and_json_arrows() {
    let r = row(json!({ "author": { "name": "ann" }, "data": { "level": 3 } }));

    assert!(filter("author.name=eq.ann").apply_filters(&r));
    assert!(filter("data->>level=gt.2").apply_filters(&r));
}

// ---- path queries ------------------------------------------------------

#[test]
fn has_filters_on_paths_needs_non_negated_equality() {
    assert!(filter("id=eq.1&status=eq.open").has_filters_on_paths(&["id"]));
    assert!(filter("id=in.(1,2)").has_filters_on_paths(&["id"]));
    assert!(filter("or=(id.eq.1,id.eq.2)").has_filters_on_paths(&["id"]));
    assert!(!filter("id=gt.1").has_filters_on_paths(&["id"]));
    assert!(!filter("id=not.eq.1").has_filters_on_paths(&["id"]));
    assert!(!filter("not.or=(id.eq.1,id.eq.2)").has_filters_on_paths(&["id"]));
    assert!(!filter("id=eq.1").has_filters_on_paths(&["id", "tenant"]));
}

#[test]
fn scoped_evaluation_ignores_other_paths() {
    let f = filter("id=eq.2&status=eq.open");
    let r = row(json!({ "id": 2, "status": "closed" }));

    assert!(!f.apply_filters(&r));
    assert!(f.apply_filters_on_paths(&r, &["id"]));
    assert!(!f.apply_filters_on_paths(&r, &["status"]));
    assert!(f.apply_filters_on_paths(&r, &["missing"]));
}

#[test]
fn exclusive_paths_prune_at_parse() {
    let f = Filter::parse(
        "author_id=eq.5&or=(title.eq.a,author_id.eq.6)",
        &FilterOptions::exclusive(["author_id"]),
    )
    .expect("query should parse");

    assert!(!f.has_paths(&["title"]));
    assert!(!f.apply_filters(&row(json!({ "author_id": 5 }))));
    assert!(!f.apply_filters(&row(json!({ "author_id": 6 }))));

    let single = Filter::parse("id=eq.5&title=eq.x", &FilterOptions::exclusive(["id"]))
        .expect("query should parse");
    assert!(single.apply_filters(&row(json!({ "id": 5 }))));
}

#[test]
fn fully_pruned_filters_match_everything() {
    let f = Filter::parse("title=eq.x", &FilterOptions::exclusive(["id"]))
        .expect("query should parse");

    assert!(f.root().children.is_empty());
    assert!(f.apply_filters(&row(json!({}))));
}

// ---- select and denormalize -------------------------------------------

#[test]
fn select_paths_cover_aliases_and_embeddings() {
    let f = filter("select=id,title:name,author:users!author_id(full_name),...tags(label),data->>color");
    let paths: Vec<(&str, &str)> = f
        .select_paths()
        .iter()
        .map(|s| (s.path.as_str(), s.alias.as_str()))
        .collect();

    assert_eq!(
        paths,
        vec![
            ("id", "id"),
            ("name", "title"),
            ("users.full_name", "author.full_name"),
            ("tags.label", "label"),
            ("data->>color", "color"),
        ]
    );
}

#[test]
fn malformed_select_is_rejected() {
    assert!(matches!(
        Filter::parse("select=id,author(name", &FilterOptions::default()),
        Err(FilterParseError::InvalidSelect { .. })
    ));
}

#[test]
fn denormalize_expands_and_aliases() {
    let f = filter("select=id,title:name,author:users(full_name)");
    let input = row(json!({ "id": 1, "name": "post", "users.full_name": "Ann" }));
    let out = f.denormalize(&input);

    assert_eq!(
        serde_json::Value::Object(out.clone()),
        json!({
            "id": 1,
            "name": "post",
            "title": "post",
            "users": { "full_name": "Ann" },
            "author": { "full_name": "Ann" },
        })
    );
    assert_eq!(f.denormalize(&out), out);
    assert!(f.apply(&out));
}

#[test]
fn apply_requires_selected_columns() {
    let f = filter("select=id,title&status=eq.open");

    assert!(f.apply(&row(json!({ "id": 1, "title": "t", "status": "open" }))));
    assert!(!f.apply(&row(json!({ "id": 1, "status": "open" }))));
    assert!(!f.apply(&row(json!({ "id": 1, "title": "t", "status": "done" }))));
}

// ---- memo --------------------------------------------------------------

#[test]
fn memo_returns_the_same_parse() {
    let memo = FilterMemo::new();
    let opts = FilterOptions::default();

    let a = memo.get_or_parse("id=eq.1", &opts).expect("query should parse");
    let b = memo.get_or_parse("id=eq.1", &opts).expect("query should parse");
    let scoped = memo
        .get_or_parse("id=eq.1", &FilterOptions::exclusive(["id"]))
        .expect("query should parse");

    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert!(!std::sync::Arc::ptr_eq(&a, &scoped));
    assert_eq!(memo.len(), 2);

    assert!(memo.get_or_parse("id=nope.1", &opts).is_err());
    assert_eq!(memo.len(), 2);

    memo.clear();
    assert!(memo.is_empty());
}
