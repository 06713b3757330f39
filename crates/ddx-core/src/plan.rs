//! # Plan Arena
//!
//! A finished plan is handed to the pass as a `PlannedStmt`: an arena of plan
//! nodes addressed by integer `NodeId`, the id of the root node, and the range
//! table the scans refer to. The caller owns the arena; the pass reads it and
//! returns its annotations in a side table keyed by `NodeId`.
//!
//! ## Node Kinds
//!
//! `NodeKind` is a closed enum. Every kind the planner can emit has a variant,
//! and the walker matches on it exhaustively, so adding a kind forces a decision
//! about how it affects dispatch. Plans arriving from an external producer that
//! cannot be mapped onto a known kind carry `NodeKind::Unrecognized`, which the
//! walker rejects.
//!
//! ## Structural Children
//!
//! A node's structural children are, in order: the sub-selects referenced from
//! its expressions (target list, qual, kind-specific quals), its plan children,
//! and its init plans. For a `SubPlan` node the children are its argument
//! expressions' sub-selects; its plan is reached through `NodeKind::SubPlan::plan`.

use crate::error::DispatchError;
use crate::expr::{Expr, TableRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node in the `PlanArena`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 1-based index into the range table, as stored on scan nodes.
pub type RangeIndex = u32;

/// What a range-table entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    /// A base relation with a catalog entry and a distribution policy.
    Relation,
    Subquery,
    Function,
    Values,
    Cte,
}

/// One entry of the statement's range table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeTableEntry {
    pub kind: RangeKind,
    /// Catalog table, for `RangeKind::Relation` entries.
    pub table: Option<TableRef>,
    /// Alias used to qualify column references to this entry.
    pub alias: String,
    /// The planner decided to treat this relation as randomly distributed.
    #[serde(default)]
    pub force_dist_random: bool,
}

impl RangeTableEntry {
    pub fn relation(table: TableRef, alias: impl Into<String>) -> Self {
        Self {
            kind: RangeKind::Relation,
            table: Some(table),
            alias: alias.into(),
            force_dist_random: false,
        }
    }
}

/// Motion (data redistribution) flavours. The pass treats them alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionType {
    Gather,
    Hash,
    Broadcast,
    Explicit,
}

/// Plan node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Result,
    Append,
    MergeAppend,
    LockRows,
    ModifyTable,
    BitmapAnd,
    BitmapOr,
    SubqueryScan,
    ValuesScan,
    Material,
    Repeat,
    NestLoop {
        #[serde(default)]
        join_qual: Option<Expr>,
    },
    MergeJoin {
        #[serde(default)]
        join_qual: Option<Expr>,
    },
    HashJoin {
        #[serde(default)]
        join_qual: Option<Expr>,
    },
    Agg,
    Sort,
    Unique,
    Hash,
    SetOp,
    Limit,
    WindowAgg,
    TableFunctionScan,
    RecursiveUnion,
    PartitionSelector,
    SplitUpdate,

    /// Sequential scan; its qual is `PlanNode::qual`.
    SeqScan { scan_rel: RangeIndex },
    /// Index scan. `index_qual_orig` is the index condition before the planner
    /// rewrote it into index-column form.
    IndexScan {
        scan_rel: RangeIndex,
        #[serde(default)]
        index_qual_orig: Option<Expr>,
    },
    IndexOnlyScan {
        scan_rel: RangeIndex,
        #[serde(default)]
        index_qual_orig: Option<Expr>,
    },
    BitmapIndexScan {
        scan_rel: RangeIndex,
        #[serde(default)]
        index_qual_orig: Option<Expr>,
    },
    BitmapHeapScan {
        scan_rel: RangeIndex,
        #[serde(default)]
        bitmap_qual_orig: Option<Expr>,
    },

    ExternalScan { scan_rel: RangeIndex },
    TidScan { scan_rel: RangeIndex },
    FunctionScan,
    WorkTableScan,
    ForeignScan { scan_rel: RangeIndex },
    ShareInputScan,

    /// Redistribution boundary: the subtree below runs as its own slice.
    Motion { motion_type: MotionType },
    /// A sub-select. `plan` is the root of the subquery's plan.
    SubPlan {
        plan: NodeId,
        is_init_plan: bool,
        #[serde(default)]
        args: Vec<Expr>,
    },

    /// A node the producing planner emitted but this pass has no rule for.
    /// Always rejected by the walker.
    Unrecognized { tag: String },
}

impl NodeKind {
    /// Short name for logging.
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Result => "Result",
            NodeKind::Append => "Append",
            NodeKind::MergeAppend => "MergeAppend",
            NodeKind::LockRows => "LockRows",
            NodeKind::ModifyTable => "ModifyTable",
            NodeKind::BitmapAnd => "BitmapAnd",
            NodeKind::BitmapOr => "BitmapOr",
            NodeKind::SubqueryScan => "SubqueryScan",
            NodeKind::ValuesScan => "ValuesScan",
            NodeKind::Material => "Material",
            NodeKind::Repeat => "Repeat",
            NodeKind::NestLoop { .. } => "NestLoop",
            NodeKind::MergeJoin { .. } => "MergeJoin",
            NodeKind::HashJoin { .. } => "HashJoin",
            NodeKind::Agg => "Agg",
            NodeKind::Sort => "Sort",
            NodeKind::Unique => "Unique",
            NodeKind::Hash => "Hash",
            NodeKind::SetOp => "SetOp",
            NodeKind::Limit => "Limit",
            NodeKind::WindowAgg => "WindowAgg",
            NodeKind::TableFunctionScan => "TableFunctionScan",
            NodeKind::RecursiveUnion => "RecursiveUnion",
            NodeKind::PartitionSelector => "PartitionSelector",
            NodeKind::SplitUpdate => "SplitUpdate",
            NodeKind::SeqScan { .. } => "SeqScan",
            NodeKind::IndexScan { .. } => "IndexScan",
            NodeKind::IndexOnlyScan { .. } => "IndexOnlyScan",
            NodeKind::BitmapIndexScan { .. } => "BitmapIndexScan",
            NodeKind::BitmapHeapScan { .. } => "BitmapHeapScan",
            NodeKind::ExternalScan { .. } => "ExternalScan",
            NodeKind::TidScan { .. } => "TidScan",
            NodeKind::FunctionScan => "FunctionScan",
            NodeKind::WorkTableScan => "WorkTableScan",
            NodeKind::ForeignScan { .. } => "ForeignScan",
            NodeKind::ShareInputScan => "ShareInputScan",
            NodeKind::Motion { .. } => "Motion",
            NodeKind::SubPlan { .. } => "SubPlan",
            NodeKind::Unrecognized { tag } => tag,
        }
    }

    /// Expressions carried by the kind itself (join quals, original index quals,
    /// subplan arguments).
    fn own_exprs(&self) -> Vec<&Expr> {
        match self {
            NodeKind::NestLoop { join_qual }
            | NodeKind::MergeJoin { join_qual }
            | NodeKind::HashJoin { join_qual } => join_qual.iter().collect(),
            NodeKind::IndexScan {
                index_qual_orig, ..
            }
            | NodeKind::IndexOnlyScan {
                index_qual_orig, ..
            }
            | NodeKind::BitmapIndexScan {
                index_qual_orig, ..
            } => index_qual_orig.iter().collect(),
            NodeKind::BitmapHeapScan {
                bitmap_qual_orig, ..
            } => bitmap_qual_orig.iter().collect(),
            NodeKind::SubPlan { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// A node of the finished plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub qual: Option<Expr>,
    #[serde(default)]
    pub target_list: Vec<Expr>,
    /// Plan children (outer first, then inner; or the members of an Append).
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Init-plan `SubPlan` nodes attached to this node.
    #[serde(default)]
    pub init_plans: Vec<NodeId>,
}

impl PlanNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            qual: None,
            target_list: Vec::new(),
            children: Vec::new(),
            init_plans: Vec::new(),
        }
    }

    pub fn with_qual(mut self, qual: Expr) -> Self {
        self.qual = Some(qual);
        self
    }

    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }

    pub fn with_target_list(mut self, target_list: Vec<Expr>) -> Self {
        self.target_list = target_list;
        self
    }

    pub fn with_init_plans(mut self, init_plans: Vec<NodeId>) -> Self {
        self.init_plans = init_plans;
        self
    }

    /// Structural children in visitation order (see module docs).
    pub fn structural_children(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .target_list
            .iter()
            .chain(self.qual.iter())
            .chain(self.kind.own_exprs())
            .flat_map(|e| e.subplans())
            .collect();
        out.extend(self.children.iter().copied());
        out.extend(self.init_plans.iter().copied());
        out
    }
}

/// Arena of plan nodes addressed by `NodeId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanArena {
    nodes: Vec<PlanNode>,
}

impl PlanArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its id.
    pub fn add(&mut self, node: PlanNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Result<&PlanNode, DispatchError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(DispatchError::DanglingNode(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A finished plan, ready for the dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStmt {
    pub arena: PlanArena,
    pub root: NodeId,
    #[serde(default)]
    pub range_table: Vec<RangeTableEntry>,
}

impl PlannedStmt {
    pub fn new(arena: PlanArena, root: NodeId, range_table: Vec<RangeTableEntry>) -> Self {
        Self {
            arena,
            root,
            range_table,
        }
    }

    /// Fetch a range-table entry by its 1-based index.
    pub fn range_entry(&self, index: RangeIndex) -> Option<&RangeTableEntry> {
        let slot = (index as usize).checked_sub(1)?;
        self.range_table.get(slot)
    }
}
