//! # Possible Value Sets
//!
//! The resolver needs to know, for one column, which values a row could hold
//! and still satisfy a scan's predicate. The answer is either "anything"
//! (`PossibleValueSet::Unconstrained`) or a finite, deduplicated list of
//! candidate expressions. An empty list means the predicate can never be true
//! for any row.
//!
//! ## Soundness
//!
//! The oracle may over-approximate (return more candidates than can actually
//! match, or `Unconstrained`), but it must never leave out a value a matching row
//! could have. Candidates are usually literals; an executor-bound parameter can
//! also appear as a candidate, and the resolver refuses to hash it.
//!
//! ## Default Oracle
//!
//! `DefaultValueSetOracle` understands the predicate shapes the planner leaves
//! on scans after constant folding:
//!
//! - `col = literal`, `literal = col`, `col = $n`
//! - `col IN (literal, ...)`
//! - `col IS NULL`
//! - `col = NULL` and a constant `false`/`NULL` qual (never true: empty set)
//! - `AND` (intersection of the constrained conjuncts)
//! - `OR` (union; one unconstrained branch makes the whole OR unconstrained)
//!
//! Anything else says nothing about the column.

use crate::expr::{BinaryOp, ColumnRef, Expr, ScalarValue, UnaryOp};
use crate::policy::HashOpFamily;

/// What a predicate implies about the values of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PossibleValueSet {
    /// Any value is possible.
    Unconstrained,
    /// Only these candidates are possible (deduplicated). Empty means no row can
    /// satisfy the predicate.
    Values(Vec<Expr>),
}

impl PossibleValueSet {
    pub fn empty() -> Self {
        PossibleValueSet::Values(Vec::new())
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, PossibleValueSet::Unconstrained)
    }

    /// Candidates a row may take under both `self` and `other`.
    ///
    /// When either side has a non-constant candidate, equality between
    /// candidates says nothing, so one side is kept whole: the all-constant side
    /// if there is one, otherwise `self`.
    fn intersect(self, other: PossibleValueSet) -> PossibleValueSet {
        match (self, other) {
            (PossibleValueSet::Unconstrained, x) | (x, PossibleValueSet::Unconstrained) => x,
            (PossibleValueSet::Values(a), PossibleValueSet::Values(b)) => {
                let a_const = a.iter().all(Expr::is_constant);
                let b_const = b.iter().all(Expr::is_constant);
                match (a_const, b_const) {
                    (true, true) => {
                        PossibleValueSet::Values(a.into_iter().filter(|v| b.contains(v)).collect())
                    }
                    (false, true) => PossibleValueSet::Values(b),
                    _ => PossibleValueSet::Values(a),
                }
            }
        }
    }

    fn union(self, other: PossibleValueSet) -> PossibleValueSet {
        match (self, other) {
            (PossibleValueSet::Values(mut a), PossibleValueSet::Values(b)) => {
                for v in b {
                    push_unique(&mut a, v);
                }
                PossibleValueSet::Values(a)
            }
            _ => PossibleValueSet::Unconstrained,
        }
    }
}

/// Predicate abstract interpreter consulted by the resolver.
pub trait ValueSetOracle: Send + Sync {
    /// Which values `column` may hold in rows satisfying `predicate`, compared
    /// with the equality operator of `opfamily`.
    fn possible_values(
        &self,
        predicate: &Expr,
        column: &ColumnRef,
        opfamily: HashOpFamily,
    ) -> PossibleValueSet;
}

/// Built-in oracle for equality, IN-list, IS NULL, AND and OR predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueSetOracle;

impl ValueSetOracle for DefaultValueSetOracle {
    fn possible_values(
        &self,
        predicate: &Expr,
        column: &ColumnRef,
        opfamily: HashOpFamily,
    ) -> PossibleValueSet {
        analyze(predicate, column, opfamily)
    }
}

fn analyze(expr: &Expr, column: &ColumnRef, opfamily: HashOpFamily) -> PossibleValueSet {
    match expr {
        Expr::And(_) => expr
            .conjuncts()
            .into_iter()
            .map(|c| analyze(c, column, opfamily))
            .fold(PossibleValueSet::Unconstrained, PossibleValueSet::intersect),
        Expr::Or(disjuncts) => {
            let mut acc = PossibleValueSet::empty();
            for d in disjuncts {
                acc = acc.union(analyze(d, column, opfamily));
                if acc.is_unconstrained() {
                    break;
                }
            }
            acc
        }
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(c), other) | (other, Expr::Column(c)) if c.same_column(column) => {
                equality_candidate(other, opfamily)
            }
            _ => PossibleValueSet::Unconstrained,
        },
        Expr::InList {
            expr,
            list,
            negated: false,
        } => match expr.as_ref() {
            Expr::Column(c) if c.same_column(column) => {
                let mut values = Vec::new();
                for item in list {
                    match equality_candidate(item, opfamily) {
                        PossibleValueSet::Values(vs) => {
                            for v in vs {
                                push_unique(&mut values, v);
                            }
                        }
                        PossibleValueSet::Unconstrained => return PossibleValueSet::Unconstrained,
                    }
                }
                PossibleValueSet::Values(values)
            }
            _ => PossibleValueSet::Unconstrained,
        },
        Expr::UnaryOp {
            op: UnaryOp::IsNull,
            operand,
        } => match operand.as_ref() {
            Expr::Column(c) if c.same_column(column) => {
                PossibleValueSet::Values(vec![Expr::Literal(ScalarValue::Null)])
            }
            _ => PossibleValueSet::Unconstrained,
        },
        // A qual folded to constant false or NULL filters out every row.
        Expr::Literal(ScalarValue::Bool(false)) | Expr::Literal(ScalarValue::Null) => {
            PossibleValueSet::empty()
        }
        _ => PossibleValueSet::Unconstrained,
    }
}

/// Candidates for `column = other`.
fn equality_candidate(other: &Expr, opfamily: HashOpFamily) -> PossibleValueSet {
    match other {
        // `= NULL` is never true.
        Expr::Literal(ScalarValue::Null) => PossibleValueSet::empty(),
        Expr::Literal(v) if opfamily.accepts(v) => PossibleValueSet::Values(vec![other.clone()]),
        Expr::Param(_) => PossibleValueSet::Values(vec![other.clone()]),
        _ => PossibleValueSet::Unconstrained,
    }
}

fn push_unique(values: &mut Vec<Expr>, v: Expr) {
    if !values.contains(&v) {
        values.push(v);
    }
}
