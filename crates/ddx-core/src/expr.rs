//! # Scalar Expressions
//!
//! Quals, target lists, and index conditions in a finished plan are trees of
//! scalar expressions. The dispatch pass never evaluates them; it only asks the
//! possible-value-set oracle what a predicate implies about a column, and it
//! scans expressions for nested sub-selects (`Expr::SubPlan`) that open slices of
//! their own.
//!
//! ## Constants vs. Parameters
//!
//! Only `Expr::Literal` is a planning-time constant. `Expr::Param` is bound by the
//! executor (correlated subplans, prepared statements), so a candidate value that
//! is a parameter can never be hashed to a segment at planning time.

use crate::plan::NodeId;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Reference to a column.
///
/// `table` is the range-table alias the column was resolved against. An
/// unqualified reference (`None`) matches a column of the same name on any side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
    pub index: u32,
}

impl ColumnRef {
    pub fn new(table: Option<&str>, name: impl Into<String>, index: u32) -> Self {
        Self {
            table: table.map(str::to_string),
            name: name.into(),
            index,
        }
    }

    /// Whether `other` denotes the same column as `self` for predicate analysis.
    pub fn same_column(&self, other: &ColumnRef) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.table, &other.table) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.table {
            write!(f, "{}.{}", t, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Scalar value for expressions.
///
/// Uses `OrderedFloat` for `f64` so that literals can be deduplicated in value
/// sets and compared with Eq/Hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL value.
    Null,
    /// Boolean true/false.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point, wrapped in OrderedFloat for Eq/Hash support.
    Float64(OrderedFloat<f64>),
    /// UTF-8 string.
    Utf8(String),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "'{v}'"),
            Self::Date(v) => write!(f, "date({v})"),
        }
    }
}

/// Scalar expressions found in quals, target lists, and index conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a column by name and ordinal index.
    Column(ColumnRef),
    /// Constant literal value.
    Literal(ScalarValue),
    /// Executor-bound parameter (`$n`). Never a planning-time constant.
    Param(u32),
    /// Binary operation (e.g., `a + b`, `x = y`, `price > 100`).
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation (e.g., `NOT flag`, `-value`, `IS NULL`).
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    /// Named function call (e.g., `UPPER(name)`, `ABS(value)`).
    Function { name: String, args: Vec<Expr> },
    /// `expr [NOT] IN (list...)`.
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// Conjunction (AND) of multiple predicates, stored flat.
    And(Vec<Expr>),
    /// Disjunction (OR) of multiple predicates.
    Or(Vec<Expr>),
    /// Expression sub-select; refers to a `NodeKind::SubPlan` node in the arena.
    SubPlan(NodeId),
}

impl Expr {
    pub fn column(table: Option<&str>, name: &str, index: u32) -> Self {
        Expr::Column(ColumnRef::new(table, name, index))
    }

    /// `left = right`.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `expr IN (list...)`.
    pub fn in_list(expr: Expr, list: Vec<Expr>) -> Self {
        Expr::InList {
            expr: Box::new(expr),
            list,
            negated: false,
        }
    }

    /// Whether this expression is a planning-time constant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Return every sub-select referenced by this expression, in visitation order.
    pub fn subplans(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.visit(&mut |e| {
            if let Expr::SubPlan(id) = e {
                ids.push(*id);
            }
        });
        ids
    }

    /// Flatten AND-chains: (A AND (B AND C)) → [A, B, C].
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Pre-order traversal over this expression and all of its sub-expressions.
    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Param(_) | Expr::SubPlan(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::UnaryOp { operand, .. } => operand.visit(f),
            Expr::Function { args, .. } => {
                for a in args {
                    a.visit(f);
                }
            }
            Expr::InList { expr, list, .. } => {
                expr.visit(f);
                for e in list {
                    e.visit(f);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.visit(f);
                }
            }
        }
    }
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Equality comparison (`=`).
    Eq,
    /// Inequality comparison (`<>` or `!=`).
    NotEq,
    /// Less than (`<`).
    Lt,
    /// Less than or equal (`<=`).
    LtEq,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal (`>=`).
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Boolean negation (`NOT`).
    Not,
    /// Arithmetic negation (unary minus).
    Neg,
    /// Null check (`IS NULL`).
    IsNull,
    /// Non-null check (`IS NOT NULL`).
    IsNotNull,
}
