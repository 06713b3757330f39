//! # Scan Dispatch Resolution
//!
//! For one scan, work out which segments can hold rows that satisfy the scan's
//! predicate, using the scanned relation's distribution policy.
//!
//! ## Algorithm
//!
//! 1. **No policy**: a non-relation range entry, a relation the planner forced
//!    to random distribution, or a relation without a policy cannot be narrowed.
//! 2. **Segment-id fast path** (hash or random policies): if the predicate pins
//!    the `gp_segment_id` pseudo-column to `k` explicit segments with
//!    `0 < k < N`, dispatch to exactly those. No hashing is needed.
//! 3. **Hash path** (hash policies): ask the oracle for the possible values of
//!    every distribution key column.
//!    - any column unconstrained: full dispatch;
//!    - some column has no possible value: the predicate is unsatisfiable, so
//!      the scan returns no rows anywhere ("no rows");
//!    - fewer than `N * combination_factor` key combinations: hash every
//!      combination and dispatch to the union of the resulting segments;
//!    - otherwise the combinations would likely cover most segments anyway, so
//!      the pass does not bother: full dispatch.
//!
//! Every candidate that is hashed must be a literal. A parameter or any other
//! non-constant candidate voids the hash path.
//!
//! ## Which Predicate
//!
//! Sequential scans use their qual. Index-family scans must use the *original*
//! index condition: the rewritten form refers to index columns and can hide the
//! constants the oracle needs.

use crate::catalog::Catalog;
use crate::decision::{DispatchDecision, SegmentId};
use crate::expr::{ColumnRef, Expr, ScalarValue};
use crate::hash::SegmentHasher;
use crate::plan::{RangeKind, RangeTableEntry};
use crate::policy::{DistributionPolicy, HashOpFamily, SEGMENT_ID_COLUMN, SEGMENT_ID_INDEX};
use crate::value_set::{PossibleValueSet, ValueSetOracle};
use std::collections::BTreeSet;
use tracing::trace;

/// Computes the dispatch decision for a single scan.
pub struct ScanDispatchResolver<'a> {
    pub catalog: &'a dyn Catalog,
    pub oracle: &'a dyn ValueSetOracle,
    pub hasher: &'a dyn SegmentHasher,
    /// See `DispatchConfig::combination_factor`.
    pub combination_factor: usize,
}

impl ScanDispatchResolver<'_> {
    /// Decide where a scan of `rte` filtered by `qual` has to run.
    pub fn resolve(&self, rte: &RangeTableEntry, qual: Option<&Expr>) -> DispatchDecision {
        let Some(policy) = self.policy_for(rte) else {
            trace!("No usable policy for '{}': full dispatch", rte.alias);
            return DispatchDecision::full();
        };
        let Some(qual) = qual else {
            return DispatchDecision::full();
        };

        if policy.is_partitioned() {
            if let Some(segments) = self.segment_id_fast_path(rte, &policy, qual) {
                trace!("'{}' pinned to segments {:?} by {}", rte.alias, segments, SEGMENT_ID_COLUMN);
                return DispatchDecision::to_segments(segments);
            }
        }

        if policy.is_hash_partitioned() {
            return self.hash_path(rte, &policy, qual);
        }

        DispatchDecision::full()
    }

    fn policy_for(&self, rte: &RangeTableEntry) -> Option<DistributionPolicy> {
        if rte.kind != RangeKind::Relation || rte.force_dist_random {
            return None;
        }
        let table = rte.table.as_ref()?;
        self.catalog.distribution_policy(table)
    }

    /// Segments named by a predicate on the segment-id pseudo-column, if it
    /// names between one and `N - 1` valid segments.
    fn segment_id_fast_path(
        &self,
        rte: &RangeTableEntry,
        policy: &DistributionPolicy,
        qual: &Expr,
    ) -> Option<BTreeSet<SegmentId>> {
        let num_segments = policy.num_segments();
        let column = ColumnRef::new(Some(&rte.alias), SEGMENT_ID_COLUMN, SEGMENT_ID_INDEX);
        let PossibleValueSet::Values(candidates) =
            self.oracle.possible_values(qual, &column, HashOpFamily::Integer)
        else {
            return None;
        };
        if candidates.is_empty() || candidates.len() >= num_segments {
            return None;
        }

        candidates
            .iter()
            .map(|c| match c {
                Expr::Literal(ScalarValue::Int64(id)) if (0..num_segments as i64).contains(id) => {
                    Some(*id as SegmentId)
                }
                _ => None,
            })
            .collect()
    }

    fn hash_path(
        &self,
        rte: &RangeTableEntry,
        policy: &DistributionPolicy,
        qual: &Expr,
    ) -> DispatchDecision {
        let num_segments = policy.num_segments();
        let keys = policy.keys();
        let mut per_key: Vec<Vec<Expr>> = Vec::with_capacity(keys.len());
        let mut combinations: usize = 1;

        for key in keys {
            let column = ColumnRef {
                table: Some(rte.alias.clone()),
                ..key.column.clone()
            };
            match self.oracle.possible_values(qual, &column, key.opfamily) {
                PossibleValueSet::Unconstrained => {
                    trace!("'{}' key {} unconstrained: full dispatch", rte.alias, column);
                    return DispatchDecision::full();
                }
                PossibleValueSet::Values(values) => {
                    combinations = combinations.saturating_mul(values.len());
                    per_key.push(values);
                }
            }
        }

        if combinations == 0 {
            trace!("'{}' qual is unsatisfiable: no rows", rte.alias);
            return DispatchDecision::no_rows();
        }
        if combinations >= num_segments.saturating_mul(self.combination_factor) {
            trace!(
                "'{}' has {} key combinations over {} segments: full dispatch",
                rte.alias,
                combinations,
                num_segments
            );
            return DispatchDecision::full();
        }

        let mut literals: Vec<Vec<ScalarValue>> = Vec::with_capacity(per_key.len());
        for values in per_key {
            let mut column_literals = Vec::with_capacity(values.len());
            for v in values {
                match v {
                    Expr::Literal(lit) => column_literals.push(lit),
                    _ => return DispatchDecision::full(),
                }
            }
            literals.push(column_literals);
        }

        let opfamilies: Vec<HashOpFamily> = keys.iter().map(|k| k.opfamily).collect();
        let mut segments = BTreeSet::new();
        let mut tuple = Vec::with_capacity(literals.len());
        for index in 0..combinations {
            // Mixed-radix decode of `index`: one digit per key column.
            let mut cur = index;
            tuple.clear();
            for column_literals in &literals {
                let n = column_literals.len();
                tuple.push(column_literals[cur % n].clone());
                cur /= n;
            }
            segments.insert(self.hasher.hash_segment(&tuple, &opfamilies, num_segments));
        }

        DispatchDecision::to_segments(segments)
    }
}
