//! Integration tests for predicate range extraction and index selection.

mod common;

use std::sync::Arc;

use common::{
    init_tracing, random_users, users, users_by_age, users_by_name, users_by_tag_desc, users_store,
};
use ormql_core::optimizer::PredicateParser;
use ormql_core::{
    explain, ColumnType, CompareOp, Expr, IndexOptimizer, Interpreter, KeyExpr, Method,
    OptimizerConfig, OrderItem, ParameterContext, Provider, ProviderKind, StaticIndexCatalog,
    Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEED: u64 = 0x0A11_CE55;

fn optimizer() -> IndexOptimizer {
    let primary = users();
    let catalog = StaticIndexCatalog::new()
        .with_index(primary.id, users_by_age())
        .with_index(primary.id, users_by_name())
        .with_index(primary.id, users_by_tag_desc());
    IndexOptimizer::new(OptimizerConfig::default(), Arc::new(catalog))
}

fn filtered(predicate: Expr) -> Arc<Provider> {
    Arc::new(Provider::filter(Provider::index_scan(users()), predicate))
}

#[test]
fn test_point_predicate_on_unique_key_becomes_seek() {
    init_tracing();
    let plan = filtered(Expr::eq(Expr::col(0), Expr::lit(5)));
    let optimized = optimizer().optimize(&plan, &ParameterContext::new()).unwrap();

    match optimized.kind() {
        ProviderKind::Seek { index, key } => {
            assert_eq!(index.name, "Users.PK");
            assert_eq!(key, &KeyExpr::Literal(Value::Int32(5)));
        }
        _ => panic!("expected seek, got:\n{}", explain(&optimized)),
    }
}

#[test]
fn test_bounded_range_uses_secondary_index() {
    init_tracing();
    let plan = filtered(Expr::and(
        Expr::gt(Expr::col(2), Expr::lit(18)),
        Expr::lt(Expr::col(2), Expr::lit(65)),
    ));
    let optimized = optimizer().optimize(&plan, &ParameterContext::new()).unwrap();

    // The secondary scan is re-sorted into primary key order because the
    // root observes the filter's order.
    let ProviderKind::Sort { source, order } = optimized.kind() else {
        panic!("expected sort, got:\n{}", explain(&optimized));
    };
    assert_eq!(order, &vec![OrderItem::asc(0)]);
    match source.kind() {
        ProviderKind::Range { index, range } => {
            assert_eq!(index.name, "Users.Age");
            assert_eq!(range.to_string(), "((key > 18) & (key < 65))");
        }
        _ => panic!("expected range, got:\n{}", explain(&optimized)),
    }
}

#[test]
fn test_negated_disjunction_matches_brute_force() {
    init_tracing();
    let predicate = Expr::not(Expr::or(
        Expr::eq(Expr::col(1), Expr::lit("a")),
        Expr::eq(Expr::col(3), Expr::lit("b")),
    ));
    let params = ParameterContext::new();
    let mut rng = StdRng::seed_from_u64(SEED);
    let rows = random_users(&mut rng, 200);

    // Name is constrained to != "a" exactly; the tag comparison is not on
    // the key and widens to the full range.
    let extraction = PredicateParser::new(1, ColumnType::String).parse(&predicate);
    assert!(!extraction.exact);
    let ranges = extraction.ranges.evaluate(ColumnType::String, &params);
    for row in &rows {
        let kept = predicate.is_satisfied(row, &params).unwrap();
        let name_is_a = row[1] == Value::from("a");
        assert_eq!(ranges.contains(&row[1]), !name_is_a);
        if kept {
            assert!(ranges.contains(&row[1]));
        }
    }

    // Both comparisons on the same key: inversion turns the union into an
    // intersection of complements, which is exact.
    let same_key = Expr::not(Expr::or(
        Expr::eq(Expr::col(1), Expr::lit("a")),
        Expr::eq(Expr::col(1), Expr::lit("b")),
    ));
    let extraction = PredicateParser::new(1, ColumnType::String).parse(&same_key);
    assert!(extraction.exact);
    let ranges = extraction.ranges.evaluate(ColumnType::String, &params);
    for row in &rows {
        assert_eq!(
            ranges.contains(&row[1]),
            same_key.is_satisfied(row, &params).unwrap()
        );
    }
}

#[test]
fn test_parameterized_seek_keeps_residual() {
    init_tracing();
    let plan = filtered(Expr::eq(Expr::col(0), Expr::param("id")));
    let optimized = optimizer()
        .optimize(&plan, &ParameterContext::new().with("id", 7))
        .unwrap();
    let ProviderKind::Filter { source, .. } = optimized.kind() else {
        panic!("expected residual filter, got:\n{}", explain(&optimized));
    };
    assert!(matches!(source.kind(), ProviderKind::Seek { .. }));

    let store = users_store(random_users(&mut StdRng::seed_from_u64(SEED), 20));
    for id in [3, 25] {
        let interpreter = Interpreter::new(&store, ParameterContext::new().with("id", id));
        assert_eq!(
            interpreter.execute(&optimized).unwrap(),
            interpreter.execute(&plan).unwrap()
        );
    }
}

#[test]
fn test_unprofitable_filter_unchanged() {
    init_tracing();
    let plan = filtered(Expr::call(Method::EndsWith, Expr::col(1), Expr::lit("b")));
    let optimized = optimizer().optimize(&plan, &ParameterContext::new()).unwrap();
    assert!(Arc::ptr_eq(&plan, &optimized));
}

#[test]
fn test_candidate_cache_reused_across_queries() {
    init_tracing();
    let optimizer = optimizer();
    for value in 0..5 {
        let plan = filtered(Expr::eq(Expr::col(2), Expr::lit(value)));
        optimizer.optimize(&plan, &ParameterContext::new()).unwrap();
    }
    let stats = optimizer.cache().stats();
    assert_eq!(stats.misses(), 1);
    assert_eq!(stats.hits(), 4);
    assert_eq!(optimizer.cache().len(), 1);
}

fn random_op(rng: &mut StdRng) -> CompareOp {
    [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
    ][rng.gen_range(0..6)]
}

fn random_word_literal(rng: &mut StdRng) -> Expr {
    Expr::Literal(common::random_word(rng))
}

fn random_leaf(rng: &mut StdRng) -> Expr {
    match rng.gen_range(0..12) {
        0 => Expr::compare(random_op(rng), Expr::col(1), random_word_literal(rng)),
        // Literal on the left exercises operator mirroring.
        1 => Expr::compare(random_op(rng), random_word_literal(rng), Expr::col(1)),
        2 => Expr::compare(random_op(rng), Expr::col(2), Expr::Literal(common::random_age(rng))),
        3 => Expr::compare(random_op(rng), Expr::col(2), Expr::param("p")),
        // Incomparable literal: the predicate never holds.
        4 => Expr::compare(random_op(rng), Expr::col(2), Expr::lit("x")),
        5 => {
            let column = rng.gen_range(1..3);
            let mut values: Vec<Expr> = (0..rng.gen_range(0..4))
                .map(|_| random_word_literal(rng))
                .collect();
            values.push(Expr::lit(rng.gen_range(0..100)));
            Expr::in_list(Expr::col(column), values)
        }
        6 => Expr::is_null(Expr::col(rng.gen_range(1..4))),
        7 => Expr::starts_with(Expr::col(1), random_word_literal(rng)),
        8 => Expr::starts_with(Expr::col(2), Expr::lit("a")),
        9 => Expr::eq(Expr::col(1), Expr::col(3)),
        10 => Expr::call(Method::Contains, Expr::col(1), Expr::lit("b")),
        _ => Expr::lit(rng.gen_bool(0.5)),
    }
}

fn random_predicate(rng: &mut StdRng, depth: usize) -> Expr {
    if depth == 0 || rng.gen_bool(0.3) {
        return random_leaf(rng);
    }
    match rng.gen_range(0..3) {
        0 => Expr::and(random_predicate(rng, depth - 1), random_predicate(rng, depth - 1)),
        1 => Expr::or(random_predicate(rng, depth - 1), random_predicate(rng, depth - 1)),
        _ => Expr::not(random_predicate(rng, depth - 1)),
    }
}

#[test]
fn test_extracted_ranges_never_exclude_kept_rows() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED);
    let rows = random_users(&mut rng, 150);
    let params = ParameterContext::new().with("p", 50);
    let keys = [
        (0, ColumnType::Int32),
        (1, ColumnType::String),
        (2, ColumnType::Int32),
        (3, ColumnType::String),
    ];

    for _ in 0..300 {
        let predicate = random_predicate(&mut rng, 4);
        for (column, ty) in keys {
            let extraction = PredicateParser::new(column, ty).parse(&predicate);
            let ranges = extraction.ranges.evaluate(ty, &params);
            for row in &rows {
                let kept = predicate.is_satisfied(row, &params).unwrap();
                let inside = ranges.contains(&row[column]);
                assert!(
                    inside || !kept,
                    "range {} excludes kept row {:?} for {}",
                    ranges,
                    row,
                    predicate
                );
                if extraction.exact {
                    assert_eq!(inside, kept, "exact range {} for {}", ranges, predicate);
                }
            }
        }
    }
}

#[test]
fn test_prefix_ranges_under_nested_negation() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED ^ 0xFF);
    let rows = random_users(&mut rng, 200);
    let params = ParameterContext::new();
    let parser = PredicateParser::new(1, ColumnType::String);

    for prefix in ["", "a", "ab", "b", "\u{10FFFF}", "zz"] {
        let starts = Expr::starts_with(Expr::col(1), Expr::lit(prefix));
        let shapes = [
            Expr::not(starts.clone()),
            Expr::not(Expr::and(starts.clone(), Expr::not(Expr::is_null(Expr::col(1))))),
            Expr::not(Expr::or(
                Expr::not(starts.clone()),
                Expr::eq(Expr::col(3), Expr::lit("b")),
            )),
            Expr::not(Expr::not(Expr::or(starts.clone(), Expr::gt(Expr::col(1), Expr::lit("b"))))),
        ];
        for predicate in shapes {
            let ranges = parser.parse(&predicate).ranges.evaluate(ColumnType::String, &params);
            for row in &rows {
                if predicate.is_satisfied(row, &params).unwrap() {
                    assert!(
                        ranges.contains(&row[1]),
                        "{} excludes {:?} under {}",
                        ranges,
                        row[1],
                        predicate
                    );
                }
            }
        }
    }
}

#[test]
fn test_optimized_plans_return_same_rows() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED.rotate_left(7));
    let store = users_store(random_users(&mut rng, 120));
    let optimizer = optimizer();
    let actual = ParameterContext::new().with("p", 50);
    // Costing assumes a different value than execution uses.
    let expected = ParameterContext::new().with("p", 10);
    let interpreter = Interpreter::new(&store, actual);

    let mut rewritten = 0;
    for _ in 0..300 {
        let plan = filtered(random_predicate(&mut rng, 3));
        let optimized = optimizer.optimize(&plan, &expected).unwrap();
        if !Arc::ptr_eq(&plan, &optimized) {
            rewritten += 1;
        }
        assert_eq!(
            interpreter.execute(&optimized).unwrap(),
            interpreter.execute(&plan).unwrap(),
            "plan:\n{}",
            explain(&optimized)
        );
    }
    assert!(rewritten > 0);
}
