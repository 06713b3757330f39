//! Property tests for the merge lattice and scan resolution.
//!
//! - Folding contributions into an accumulator gives the same result in any
//!   order and under any grouping.
//! - Resolution is sound: every row that satisfies a scan predicate lives on a
//!   segment the scan is dispatched to.

use ddx_core::catalog::InMemoryCatalog;
use ddx_core::decision::Accumulator;
use ddx_core::expr::*;
use ddx_core::hash::{JumpConsistentHasher, SegmentHasher};
use ddx_core::plan::RangeTableEntry;
use ddx_core::policy::{DistributionKey, DistributionPolicy, HashOpFamily};
use ddx_core::resolver::ScanDispatchResolver;
use ddx_core::value_set::DefaultValueSetOracle;
use ddx_core::DispatchDecision;
use proptest::prelude::*;

const SEGMENTS: usize = 8;
const DOMAIN: i64 = 24;

// ---------------------------------------------------------------------------
// Merge lattice
// ---------------------------------------------------------------------------

fn arb_decision() -> impl Strategy<Value = DispatchDecision> {
    prop_oneof![
        1 => Just(DispatchDecision::full()),
        2 => Just(DispatchDecision::no_rows()),
        5 => prop::collection::btree_set(0..SEGMENTS as u32, 1..4)
            .prop_map(|s| DispatchDecision::to_segments(s)),
    ]
}

fn fold(decisions: &[DispatchDecision]) -> Accumulator {
    let mut acc = Accumulator::new();
    for d in decisions {
        acc.merge(d);
    }
    acc
}

proptest! {
    #[test]
    fn merge_is_order_independent(decisions in prop::collection::vec(arb_decision(), 0..8)) {
        let forward = fold(&decisions);
        let reversed: Vec<_> = decisions.iter().rev().cloned().collect();
        prop_assert_eq!(&forward, &fold(&reversed));

        let mut rotated = decisions.clone();
        if !rotated.is_empty() {
            rotated.rotate_left(1);
        }
        prop_assert_eq!(&forward, &fold(&rotated));
    }

    #[test]
    fn merge_is_associative(
        left in prop::collection::vec(arb_decision(), 0..6),
        right in prop::collection::vec(arb_decision(), 0..6),
    ) {
        let whole: Vec<_> = left.iter().chain(right.iter()).cloned().collect();
        let mut grouped = fold(&left);
        let tail = fold(&right);
        if tail.initialized {
            grouped.merge(&tail.decision);
        }
        prop_assert_eq!(fold(&whole), grouped);
    }
}

// ---------------------------------------------------------------------------
// Resolver soundness
// ---------------------------------------------------------------------------

fn k() -> Expr {
    Expr::column(Some("t"), "k", 0)
}

fn int(v: i64) -> Expr {
    Expr::Literal(ScalarValue::Int64(v))
}

fn arb_predicate() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0..DOMAIN).prop_map(|v| Expr::eq(k(), int(v))),
        (0..DOMAIN).prop_map(|v| Expr::eq(int(v), k())),
        prop::collection::vec(0..DOMAIN, 0..6)
            .prop_map(|vs| Expr::in_list(k(), vs.into_iter().map(int).collect())),
        // Says nothing about `k`.
        (0..DOMAIN).prop_map(|v| Expr::eq(Expr::column(Some("t"), "v", 1), int(v))),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(Expr::And),
            prop::collection::vec(inner, 1..3).prop_map(Expr::Or),
        ]
    })
}

/// Whether a row with `k = key` can satisfy `pred`. Conditions on other
/// columns are assumed satisfiable.
fn may_match(pred: &Expr, key: i64) -> bool {
    match pred {
        Expr::And(ps) => ps.iter().all(|p| may_match(p, key)),
        Expr::Or(ps) => ps.iter().any(|p| may_match(p, key)),
        Expr::BinaryOp { left, right, .. } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(c), Expr::Literal(ScalarValue::Int64(v)))
            | (Expr::Literal(ScalarValue::Int64(v)), Expr::Column(c)) => {
                c.name != "k" || *v == key
            }
            _ => true,
        },
        Expr::InList { list, .. } => list.contains(&int(key)),
        _ => true,
    }
}

fn segment_of(key: i64) -> u32 {
    JumpConsistentHasher.hash_segment(
        &[ScalarValue::Int64(key)],
        &[HashOpFamily::Integer],
        SEGMENTS,
    )
}

proptest! {
    #[test]
    fn resolution_never_misses_a_matching_row(pred in arb_predicate()) {
        let mut catalog = InMemoryCatalog::new(SEGMENTS);
        let table = TableRef::new("public", "t");
        catalog.add_table(
            &table,
            DistributionPolicy::hashed(
                vec![DistributionKey {
                    column: ColumnRef::new(None, "k", 0),
                    opfamily: HashOpFamily::Integer,
                }],
                SEGMENTS,
            ),
        );
        let resolver = ScanDispatchResolver {
            catalog: &catalog,
            oracle: &DefaultValueSetOracle,
            hasher: &JumpConsistentHasher,
            combination_factor: 3,
        };
        let decision = resolver.resolve(&RangeTableEntry::relation(table, "t"), Some(&pred));

        for key in 0..DOMAIN {
            if !may_match(&pred, key) || decision.is_full() {
                continue;
            }
            let segments = decision.target_segments();
            prop_assert!(
                segments.is_some_and(|s| s.contains(&segment_of(key))),
                "row k={} matches {:?} but decision is {}",
                key,
                pred,
                decision
            );
        }
    }
}
