//! Integration tests for the ordering corrector and the skip/take rewriter.

mod common;

use std::sync::Arc;

use common::{init_tracing, random_users, users, users_store};
use ormql_core::interpreter::is_sorted_by;
use ormql_core::{
    explain, CalculatedColumn, Column, ColumnType, Error, Expr, Header, Interpreter,
    MemoryIndexStore, OrderItem, OrderingCorrector, ParameterContext, Provider,
    ProviderCapabilities, ProviderKind, SkipTakeRewriter, Value, ROW_NUMBER_COLUMN,
};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEED: u64 = 0x5EED_0F_0DE5;

fn all_capabilities() -> [ProviderCapabilities; 4] {
    [
        ProviderCapabilities::new(true, true),
        ProviderCapabilities::new(true, false),
        ProviderCapabilities::new(false, true),
        ProviderCapabilities::none(),
    ]
}

fn raw_users(rows: Vec<Vec<Value>>) -> Provider {
    Provider::raw(Header::new(users().columns), rows)
}

#[test]
fn test_row_number_fallback_without_native_paging() {
    init_tracing();
    let plan = Arc::new(Provider::take(Provider::skip(Provider::index_scan(users()), 10), 5));
    let rewritten = SkipTakeRewriter::new(ProviderCapabilities::none())
        .rewrite(&plan)
        .unwrap();

    let ProviderKind::Select { source, columns } = rewritten.kind() else {
        panic!("expected select, got:\n{}", explain(&rewritten));
    };
    assert_eq!(columns, &vec![0, 1, 2, 3]);
    let ProviderKind::Paging { source, skip, take } = source.kind() else {
        panic!("expected paging, got:\n{}", explain(&rewritten));
    };
    assert_eq!((*skip, *take), (10, 5));
    let ProviderKind::RowNumber { source, column } = source.kind() else {
        panic!("expected row numbers, got:\n{}", explain(&rewritten));
    };
    assert_eq!(column, ROW_NUMBER_COLUMN);
    assert!(matches!(source.kind(), ProviderKind::IndexScan { .. }));
    assert_eq!(rewritten.header(), plan.header());
}

#[derive(Debug, Clone, Copy)]
enum PageOp {
    Skip(u64),
    Take(u64),
    Paging(u64, u64),
}

fn apply_ops(source: Provider, ops: &[PageOp]) -> Provider {
    ops.iter().fold(source, |acc, op| match *op {
        PageOp::Skip(n) => Provider::skip(acc, n),
        PageOp::Take(n) => Provider::take(acc, n),
        PageOp::Paging(s, t) => Provider::paging(acc, s, t),
    })
}

/// Apply the chain step by step to a vector, independently of the
/// interpreter's paging operators.
fn reference(rows: &[Vec<Value>], ops: &[PageOp]) -> Vec<Vec<Value>> {
    let mut out = rows.to_vec();
    for op in ops {
        out = match *op {
            PageOp::Skip(n) => out.into_iter().skip(n as usize).collect(),
            PageOp::Take(n) => out.into_iter().take(n as usize).collect(),
            PageOp::Paging(s, t) => out.into_iter().skip(s as usize).take(t as usize).collect(),
        };
    }
    out
}

#[test]
fn test_collapsed_paging_matches_sequential_application() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED);
    let store = MemoryIndexStore::new();
    let interpreter = Interpreter::new(&store, ParameterContext::new());

    for _ in 0..200 {
        let ops: Vec<PageOp> = (0..rng.gen_range(1..6))
            .map(|_| match rng.gen_range(0..3) {
                0 => PageOp::Skip(rng.gen_range(0..6)),
                1 => PageOp::Take(rng.gen_range(0..8)),
                _ => PageOp::Paging(rng.gen_range(0..4), rng.gen_range(0..6)),
            })
            .collect();
        let first_skip = match ops[0] {
            PageOp::Skip(n) | PageOp::Paging(n, _) => n as usize,
            PageOp::Take(_) => 0,
        };
        // Empty, shorter than the first skip, exactly at it, and longer.
        let sizes = [0, first_skip.saturating_sub(1), first_skip, first_skip + 7];

        for size in sizes {
            let rows = random_users(&mut rng, size);
            let plan = Arc::new(apply_ops(raw_users(rows.clone()), &ops));
            let expected = reference(&rows, &ops);
            assert_eq!(interpreter.execute(&plan).unwrap(), expected);

            for capabilities in all_capabilities() {
                let rewritten = SkipTakeRewriter::new(capabilities).rewrite(&plan).unwrap();
                assert_eq!(
                    interpreter.execute(&rewritten).unwrap(),
                    expected,
                    "{:?} over {} rows with {:?}:\n{}",
                    ops,
                    size,
                    capabilities,
                    explain(&rewritten)
                );
            }
        }
    }
}

#[test]
fn test_paging_chains_separated_by_other_operators() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED + 1);
    let rows = random_users(&mut rng, 30);
    let inner = Provider::take(Provider::skip(raw_users(rows), 2), 20);
    let filtered = Provider::filter(inner, Expr::not(Expr::is_null(Expr::col(2))));
    let plan = Arc::new(Provider::skip(Provider::take(filtered, 9), 3));

    let store = MemoryIndexStore::new();
    let interpreter = Interpreter::new(&store, ParameterContext::new());
    let expected = interpreter.execute(&plan).unwrap();

    for capabilities in all_capabilities() {
        let rewritten = SkipTakeRewriter::new(capabilities).rewrite(&plan).unwrap();
        assert_eq!(interpreter.execute(&rewritten).unwrap(), expected);
    }

    // Two chains, two paging steps.
    let rewritten = SkipTakeRewriter::default().rewrite(&plan).unwrap();
    let text = explain(&rewritten);
    assert_eq!(text.matches("Paging").count(), 2, "{}", text);
}

#[test]
fn test_row_number_column_avoids_collisions() {
    init_tracing();
    let header = Header::new(vec![
        Column::new(ROW_NUMBER_COLUMN, ColumnType::Int64),
        Column::new("RowNumber0", ColumnType::Int64),
    ]);
    let rows = (0..5)
        .map(|i| vec![Value::Int64(i), Value::Int64(-i)])
        .collect();
    let plan = Arc::new(Provider::take(Provider::raw(header, rows), 2));
    let rewritten = SkipTakeRewriter::new(ProviderCapabilities::none())
        .rewrite(&plan)
        .unwrap();
    assert!(explain(&rewritten).contains("RowNumber RowNumber1"));

    let store = MemoryIndexStore::new();
    let rows = Interpreter::new(&store, ParameterContext::new())
        .execute(&rewritten)
        .unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::Int64(0), Value::Int64(0)],
            vec![Value::Int64(1), Value::Int64(-1)],
        ]
    );
}

/// A random order-preserving operator over `source`, with the order
/// tracked through any column renumbering.
fn random_preserving(
    rng: &mut StdRng,
    source: Provider,
    order: Vec<OrderItem>,
) -> (Provider, Vec<OrderItem>) {
    let width = source.header().len();
    match rng.gen_range(0..4) {
        0 => {
            let predicate = Expr::or(
                Expr::is_null(Expr::col(2)),
                Expr::gt(Expr::col(2), Expr::lit(rng.gen_range(0..60))),
            );
            (Provider::filter(source, predicate), order)
        }
        1 => {
            let column = CalculatedColumn::new(
                format!("c{}", width),
                ColumnType::Bool,
                Expr::is_null(Expr::col(1)),
            );
            (Provider::calculate(source, vec![column]), order)
        }
        2 => (Provider::alias(source, "u"), order),
        _ => {
            // A permutation of every column keeps all sort keys.
            let mut mapping: Vec<usize> = (0..width).collect();
            for i in (1..mapping.len()).rev() {
                let j = rng.gen_range(0..=i);
                mapping.swap(i, j);
            }
            let remapped = order
                .iter()
                .map(|item| OrderItem {
                    column: mapping.iter().position(|&c| c == item.column).unwrap_or(0),
                    direction: item.direction,
                })
                .collect();
            (Provider::select(source, mapping), remapped)
        }
    }
}

#[test]
fn test_corrected_plans_deliver_declared_order() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED + 2);
    let store = MemoryIndexStore::new();
    let interpreter = Interpreter::new(&store, ParameterContext::new());
    let corrector = OrderingCorrector::default();

    for _ in 0..150 {
        let size = rng.gen_range(0..25);
        let rows = random_users(&mut rng, size);
        // Age then id is a total order, so results are fully determined.
        let age = if rng.gen_bool(0.5) {
            OrderItem::asc(2)
        } else {
            OrderItem::desc(2)
        };
        let mut order = vec![age, OrderItem::asc(0)];
        let mut plan = Provider::sort(raw_users(rows), order.clone());
        for _ in 0..rng.gen_range(0..4) {
            (plan, order) = random_preserving(&mut rng, plan, order);
        }
        if rng.gen_bool(0.5) {
            plan = Provider::take(Provider::skip(plan, rng.gen_range(0..3)), rng.gen_range(0..10));
        }
        for _ in 0..rng.gen_range(0..2) {
            (plan, order) = random_preserving(&mut rng, plan, order);
        }

        let plan = Arc::new(plan);
        let corrected = corrector.correct(&plan).unwrap();
        let expected = interpreter.execute(&plan).unwrap();
        let actual = interpreter.execute(&corrected).unwrap();
        assert_eq!(actual, expected, "corrected plan:\n{}", explain(&corrected));
        assert!(is_sorted_by(&actual, &order));
    }
}

#[test]
fn test_sort_moves_above_filter_but_not_past_take() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED + 3);
    let store = users_store(random_users(&mut rng, 40));
    let interpreter = Interpreter::new(&store, ParameterContext::new());

    let plan = Arc::new(Provider::take(
        Provider::filter(
            Provider::sort(
                Provider::index_scan(users()),
                vec![OrderItem::desc(2), OrderItem::asc(0)],
            ),
            Expr::not(Expr::is_null(Expr::col(1))),
        ),
        6,
    ));
    let corrected = OrderingCorrector::default().correct(&plan).unwrap();
    assert_eq!(
        explain(&corrected),
        "Take 6\n  Sort [#2 desc, #0 asc]\n    Filter !#1 is null\n      IndexScan Users.PK\n"
    );
    assert_eq!(
        interpreter.execute(&corrected).unwrap(),
        interpreter.execute(&plan).unwrap()
    );
}

#[test]
fn test_projection_dropping_required_order_is_fatal() {
    init_tracing();
    let plan = Arc::new(Provider::skip(
        Provider::select(
            Provider::sort(Provider::index_scan(users()), vec![OrderItem::asc(2)]),
            vec![0, 1],
        ),
        1,
    ));
    let err = OrderingCorrector::default().correct(&plan).unwrap_err();
    assert!(matches!(err, Error::OrderLost { column: 2, .. }));
    assert_eq!(
        err.to_string(),
        "Select removes column 2 which is still required for ordering"
    );
}
