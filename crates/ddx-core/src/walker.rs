//! # Plan Walker
//!
//! `DirectDispatchPass::assign` walks a finished plan once, depth-first, and
//! returns a side table of dispatch decisions for every slice root.
//!
//! ## Node Roles
//!
//! Every `NodeKind` is classified into one role by an exhaustive match:
//!
//! - **Pass-through** (joins, aggregates, sorts, containers, ...): visit the
//!   children, contribute nothing.
//! - **Scan**: resolve the scan against its relation's policy and merge the
//!   result into the innermost open slice.
//! - **Full dispatch**: leaves the pass cannot reason about (external, tid,
//!   function, work-table, foreign and shared-input scans) merge a full-dispatch
//!   contribution.
//! - **Motion**: the receiving side knows nothing about where rows come from, so
//!   it contributes full dispatch to the enclosing slice; the subtree below it is
//!   a new slice, finalized onto the Motion.
//! - **SubPlan**: a correlated (non-init) subplan runs inside its parent's slice,
//!   so its plan is walked there first. An init plan is dispatched on its own,
//!   so its plan is walked inside a fresh slice. Either way the SubPlan node then
//!   owns a slice for its arguments and is finalized.
//!
//! `NodeKind::Unrecognized` aborts the pass.
//!
//! ## Shared Nodes
//!
//! Structural edges (plan children, init plans, expression sub-selects) must
//! form a tree: each node has one structural parent and is listed once. A node
//! reached through a second structural edge aborts the pass with
//! `DispatchError::SharedNode`, so no subtree is walked twice through plan
//! edges. `SubPlan::plan` is not a structural edge: several SubPlans may run the
//! same plan, and that plan is walked once per SubPlan.
//!
//! ## Finalization
//!
//! When a slice closes, its accumulator becomes the slice root's decision:
//! nothing learned means full dispatch, and "no rows" is pinned to one fixed
//! segment so the slice still runs (as a no-op) somewhere.
//!
//! ## Multi-Slice Fallback
//!
//! Plans with more than `max_direct_dispatch_slices` plan slice roots (the top
//! root plus every Motion) get full dispatch everywhere.

use crate::catalog::Catalog;
use crate::config::DispatchConfig;
use crate::decision::{DispatchDecision, SliceStack};
use crate::error::DispatchError;
use crate::expr::Expr;
use crate::hash::{JumpConsistentHasher, SegmentHasher};
use crate::plan::{NodeId, NodeKind, PlanNode, PlannedStmt, RangeIndex};
use crate::resolver::ScanDispatchResolver;
use crate::value_set::{DefaultValueSetOracle, ValueSetOracle};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// The result of one run of the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAnnotations {
    /// Final decision for every slice root (Motions, SubPlans, the top root).
    pub decisions: BTreeMap<NodeId, DispatchDecision>,
    /// Plan slice roots in the order they were finalized.
    pub slice_roots: Vec<NodeId>,
    /// Whether the multi-slice guard reset every decision to full dispatch.
    pub multi_slice_fallback: bool,
}

impl DispatchAnnotations {
    pub fn decision(&self, node: NodeId) -> Option<&DispatchDecision> {
        self.decisions.get(&node)
    }
}

/// The direct-dispatch planning pass.
pub struct DirectDispatchPass {
    pub catalog: Arc<dyn Catalog>,
    pub oracle: Arc<dyn ValueSetOracle>,
    pub hasher: Arc<dyn SegmentHasher>,
    pub config: DispatchConfig,
}

impl DirectDispatchPass {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        oracle: Arc<dyn ValueSetOracle>,
        hasher: Arc<dyn SegmentHasher>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            catalog,
            oracle,
            hasher,
            config,
        }
    }

    /// A pass using the built-in oracle and hasher.
    pub fn with_defaults(catalog: Arc<dyn Catalog>) -> Self {
        Self::new(
            catalog,
            Arc::new(DefaultValueSetOracle),
            Arc::new(JumpConsistentHasher),
            DispatchConfig::default(),
        )
    }

    /// Compute dispatch decisions for every slice root of `stmt`.
    pub fn assign(&self, stmt: &PlannedStmt) -> Result<DispatchAnnotations, DispatchError> {
        debug!(
            "Starting direct dispatch: root={}, nodes={}, range_table={}",
            stmt.root,
            stmt.arena.len(),
            stmt.range_table.len()
        );

        let mut walk = Walk {
            stmt,
            resolver: ScanDispatchResolver {
                catalog: self.catalog.as_ref(),
                oracle: self.oracle.as_ref(),
                hasher: self.hasher.as_ref(),
                combination_factor: self.config.combination_factor,
            },
            hasher: self.hasher.as_ref(),
            num_segments: self.catalog.num_segments(),
            config: &self.config,
            stack: SliceStack::new(),
            owners: HashMap::new(),
            annotations: DispatchAnnotations::default(),
        };

        walk.visit(stmt.root, 0)?;

        // Motions and SubPlans finalize themselves.
        match stmt.arena.get(stmt.root)?.kind {
            NodeKind::Motion { .. } | NodeKind::SubPlan { .. } => {
                walk.stack.pop().ok_or(DispatchError::UnbalancedSliceStack)?;
            }
            _ => walk.finalize(stmt.root, true)?,
        }
        if walk.stack.depth() != 0 {
            return Err(DispatchError::UnbalancedSliceStack);
        }

        let mut annotations = walk.annotations;
        if annotations.slice_roots.len() > self.config.max_direct_dispatch_slices {
            debug!(
                "Plan has {} slices (limit {}): disabling direct dispatch",
                annotations.slice_roots.len(),
                self.config.max_direct_dispatch_slices
            );
            for decision in annotations.decisions.values_mut() {
                *decision = DispatchDecision::full();
            }
            annotations.multi_slice_fallback = true;
        }

        debug!(
            "Direct dispatch complete: slices={}, direct={}",
            annotations.slice_roots.len(),
            annotations.decisions.values().filter(|d| d.direct).count()
        );
        Ok(annotations)
    }
}

/// How the walker treats a node.
enum Role<'a> {
    PassThrough,
    Scan {
        scan_rel: RangeIndex,
        qual: Option<&'a Expr>,
    },
    FullDispatch,
    Motion,
    SubPlan {
        plan: NodeId,
        is_init_plan: bool,
    },
}

fn classify(id: NodeId, node: &PlanNode) -> Result<Role<'_>, DispatchError> {
    let role = match &node.kind {
        NodeKind::Result
        | NodeKind::Append
        | NodeKind::MergeAppend
        | NodeKind::LockRows
        | NodeKind::ModifyTable
        | NodeKind::BitmapAnd
        | NodeKind::BitmapOr
        | NodeKind::SubqueryScan
        | NodeKind::ValuesScan
        | NodeKind::Material
        | NodeKind::Repeat
        | NodeKind::NestLoop { .. }
        | NodeKind::MergeJoin { .. }
        | NodeKind::HashJoin { .. }
        | NodeKind::Agg
        | NodeKind::Sort
        | NodeKind::Unique
        | NodeKind::Hash
        | NodeKind::SetOp
        | NodeKind::Limit
        | NodeKind::WindowAgg
        | NodeKind::TableFunctionScan
        | NodeKind::RecursiveUnion
        | NodeKind::PartitionSelector
        | NodeKind::SplitUpdate => Role::PassThrough,

        NodeKind::SeqScan { scan_rel } => Role::Scan {
            scan_rel: *scan_rel,
            qual: node.qual.as_ref(),
        },
        // The rewritten index quals refer to index columns; only the original
        // condition is phrased over the relation's columns.
        NodeKind::IndexScan {
            scan_rel,
            index_qual_orig,
        }
        | NodeKind::IndexOnlyScan {
            scan_rel,
            index_qual_orig,
        }
        | NodeKind::BitmapIndexScan {
            scan_rel,
            index_qual_orig,
        } => Role::Scan {
            scan_rel: *scan_rel,
            qual: index_qual_orig.as_ref(),
        },
        NodeKind::BitmapHeapScan {
            scan_rel,
            bitmap_qual_orig,
        } => Role::Scan {
            scan_rel: *scan_rel,
            qual: bitmap_qual_orig.as_ref(),
        },

        NodeKind::ExternalScan { .. }
        | NodeKind::TidScan { .. }
        | NodeKind::FunctionScan
        | NodeKind::WorkTableScan
        | NodeKind::ForeignScan { .. }
        | NodeKind::ShareInputScan => Role::FullDispatch,

        NodeKind::Motion { .. } => Role::Motion,
        NodeKind::SubPlan {
            plan, is_init_plan, ..
        } => Role::SubPlan {
            plan: *plan,
            is_init_plan: *is_init_plan,
        },

        NodeKind::Unrecognized { tag } => {
            return Err(DispatchError::UnrecognizedNode {
                node: id,
                tag: tag.clone(),
            })
        }
    };
    Ok(role)
}

/// Per-invocation walk state.
struct Walk<'a> {
    stmt: &'a PlannedStmt,
    resolver: ScanDispatchResolver<'a>,
    hasher: &'a dyn SegmentHasher,
    num_segments: usize,
    config: &'a DispatchConfig,
    stack: SliceStack,
    /// Structural parent of every node reached so far.
    owners: HashMap<NodeId, NodeId>,
    annotations: DispatchAnnotations,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, id: NodeId, depth: usize) -> Result<(), DispatchError> {
        if depth > self.config.max_plan_depth {
            return Err(DispatchError::DepthExceeded {
                limit: self.config.max_plan_depth,
            });
        }
        let stmt = self.stmt;
        let node = stmt.arena.get(id)?;
        trace!("Visiting {} {}", node.kind.name(), id);

        match classify(id, node)? {
            Role::PassThrough => self.visit_children(id, node, depth),
            Role::Scan { scan_rel, qual } => {
                let rte = stmt
                    .range_entry(scan_rel)
                    .ok_or(DispatchError::MissingRangeEntry {
                        node: id,
                        index: scan_rel,
                    })?;
                let decision = self.resolver.resolve(rte, qual);
                trace!("{} {} on '{}' contributes {}", node.kind.name(), id, rte.alias, decision);
                self.contribute(&decision)?;
                self.visit_children(id, node, depth)
            }
            Role::FullDispatch => {
                self.contribute(&DispatchDecision::full())?;
                self.visit_children(id, node, depth)
            }
            Role::Motion => {
                self.contribute(&DispatchDecision::full())?;
                self.stack.push();
                self.visit_children(id, node, depth)?;
                self.finalize(id, true)
            }
            Role::SubPlan { plan, is_init_plan } => {
                if !is_init_plan {
                    self.visit(plan, depth + 1)?;
                }
                self.stack.push();
                if is_init_plan {
                    self.visit(plan, depth + 1)?;
                }
                self.visit_children(id, node, depth)?;
                self.finalize(id, false)
            }
        }
    }

    fn visit_children(
        &mut self,
        parent: NodeId,
        node: &PlanNode,
        depth: usize,
    ) -> Result<(), DispatchError> {
        let children = node.structural_children();
        for (i, &child) in children.iter().enumerate() {
            if children[..i].contains(&child) {
                return Err(DispatchError::SharedNode(child));
            }
            self.claim(parent, child)?;
            self.visit(child, depth + 1)?;
        }
        Ok(())
    }

    /// Record `parent` as the structural parent of `child`. Walking the same
    /// parent again (through a repeated `SubPlan::plan`) re-claims its own
    /// children, which is allowed.
    fn claim(&mut self, parent: NodeId, child: NodeId) -> Result<(), DispatchError> {
        if child == self.stmt.root {
            return Err(DispatchError::SharedNode(child));
        }
        match self.owners.entry(child) {
            Entry::Vacant(slot) => {
                slot.insert(parent);
                Ok(())
            }
            Entry::Occupied(owner) if *owner.get() == parent => Ok(()),
            Entry::Occupied(_) => Err(DispatchError::SharedNode(child)),
        }
    }

    fn contribute(&mut self, decision: &DispatchDecision) -> Result<(), DispatchError> {
        if self.stack.merge_into_top(decision) {
            Ok(())
        } else {
            Err(DispatchError::UnbalancedSliceStack)
        }
    }

    /// Close the innermost slice and record its decision on `id`. Plan slice
    /// roots count toward the multi-slice limit; SubPlan slices do not.
    fn finalize(&mut self, id: NodeId, plan_slice: bool) -> Result<(), DispatchError> {
        let acc = self.stack.pop().ok_or(DispatchError::UnbalancedSliceStack)?;

        let decision = if !acc.initialized {
            if self.config.print_dispatch_decisions {
                info!("Slice {}: learned no information, default to full dispatch", id);
            }
            DispatchDecision::full()
        } else if acc.decision.is_full() {
            if self.config.print_dispatch_decisions {
                info!("Slice {}: learned full dispatch is required", id);
            }
            acc.decision
        } else if acc.decision.segments.is_none() {
            if self.config.print_dispatch_decisions {
                info!("Slice {}: learned no segment dispatch is required", id);
            }
            DispatchDecision::to_segments([self.hasher.random_segment(self.num_segments)])
        } else {
            if self.config.print_dispatch_decisions {
                info!("Slice {}: learned dispatch to {}", id, acc.decision);
            }
            acc.decision
        };

        trace!("Finalized slice {} as {}", id, decision);
        self.annotations.decisions.insert(id, decision);
        if plan_slice {
            self.annotations.slice_roots.push(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::expr::{ColumnRef, ScalarValue, TableRef};
    use crate::plan::{MotionType, PlanArena, RangeTableEntry};
    use crate::policy::{DistributionKey, DistributionPolicy, HashOpFamily};

    const SEGMENTS: usize = 4;

    fn pass() -> DirectDispatchPass {
        let mut catalog = InMemoryCatalog::new(SEGMENTS);
        catalog.add_table(
            &TableRef::new("public", "t"),
            DistributionPolicy::hashed(
                vec![DistributionKey {
                    column: ColumnRef::new(None, "k", 0),
                    opfamily: HashOpFamily::Integer,
                }],
                SEGMENTS,
            ),
        );
        DirectDispatchPass::with_defaults(Arc::new(catalog))
    }

    fn range_table() -> Vec<RangeTableEntry> {
        vec![RangeTableEntry::relation(TableRef::new("public", "t"), "t")]
    }

    fn k_eq(v: i64) -> Expr {
        Expr::eq(
            Expr::column(Some("t"), "k", 0),
            Expr::Literal(ScalarValue::Int64(v)),
        )
    }

    fn seg_of(v: i64) -> u32 {
        JumpConsistentHasher.hash_segment(
            &[ScalarValue::Int64(v)],
            &[HashOpFamily::Integer],
            SEGMENTS,
        )
    }

    #[test]
    fn test_single_scan_root() {
        let mut arena = PlanArena::new();
        let scan = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 1 }).with_qual(k_eq(5)));
        let stmt = PlannedStmt::new(arena, scan, range_table());

        let ann = pass().assign(&stmt).unwrap();
        assert_eq!(ann.slice_roots, vec![scan]);
        assert_eq!(ann.decision(scan), Some(&DispatchDecision::to_segments([seg_of(5)])));
        assert!(!ann.multi_slice_fallback);
    }

    #[test]
    fn test_motion_splits_slices() {
        let mut arena = PlanArena::new();
        let scan = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 1 }).with_qual(k_eq(5)));
        let motion = arena.add(
            PlanNode::new(NodeKind::Motion {
                motion_type: MotionType::Gather,
            })
            .with_children(vec![scan]),
        );
        let root = arena.add(PlanNode::new(NodeKind::Limit).with_children(vec![motion]));
        let stmt = PlannedStmt::new(arena, root, range_table());

        let ann = pass().assign(&stmt).unwrap();
        assert_eq!(ann.slice_roots, vec![motion, root]);
        assert_eq!(ann.decision(motion), Some(&DispatchDecision::to_segments([seg_of(5)])));
        // The receiving side of a Motion cannot be narrowed.
        assert_eq!(ann.decision(root), Some(&DispatchDecision::full()));
    }

    #[test]
    fn test_root_motion_is_not_finalized_twice() {
        let mut arena = PlanArena::new();
        let scan = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 1 }).with_qual(k_eq(1)));
        let motion = arena.add(
            PlanNode::new(NodeKind::Motion {
                motion_type: MotionType::Gather,
            })
            .with_children(vec![scan]),
        );
        let stmt = PlannedStmt::new(arena, motion, range_table());

        let ann = pass().assign(&stmt).unwrap();
        assert_eq!(ann.slice_roots, vec![motion]);
        assert_eq!(ann.decisions.len(), 1);
    }

    #[test]
    fn test_nothing_learned_is_full() {
        let mut arena = PlanArena::new();
        let values = arena.add(PlanNode::new(NodeKind::ValuesScan));
        let root = arena.add(PlanNode::new(NodeKind::Result).with_children(vec![values]));
        let stmt = PlannedStmt::new(arena, root, range_table());

        let ann = pass().assign(&stmt).unwrap();
        assert_eq!(ann.decision(root), Some(&DispatchDecision::full()));
    }

    #[test]
    fn test_missing_range_entry() {
        let mut arena = PlanArena::new();
        let scan = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 3 }));
        let stmt = PlannedStmt::new(arena, scan, range_table());

        assert_eq!(
            pass().assign(&stmt),
            Err(DispatchError::MissingRangeEntry {
                node: scan,
                index: 3
            })
        );
    }

    #[test]
    fn test_cycle_through_subplan_hits_depth_limit() {
        let mut arena = PlanArena::new();
        let sub = arena.add(PlanNode::new(NodeKind::SubPlan {
            plan: NodeId(1),
            is_init_plan: false,
            args: vec![],
        }));
        let root = arena.add(
            PlanNode::new(NodeKind::Result).with_target_list(vec![Expr::SubPlan(sub)]),
        );
        let stmt = PlannedStmt::new(arena, root, range_table());

        let mut pass = pass();
        pass.config.max_plan_depth = 64;
        assert_eq!(
            pass.assign(&stmt),
            Err(DispatchError::DepthExceeded { limit: 64 })
        );
    }

    #[test]
    fn test_root_as_child_is_shared() {
        let mut arena = PlanArena::new();
        let node = arena.add(PlanNode::new(NodeKind::Sort).with_children(vec![NodeId(0)]));
        let stmt = PlannedStmt::new(arena, node, range_table());

        assert_eq!(pass().assign(&stmt), Err(DispatchError::SharedNode(node)));
    }

    #[test]
    fn test_repeated_child_is_shared() {
        let mut arena = PlanArena::new();
        let scan = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 1 }).with_qual(k_eq(5)));
        let gather = arena.add(
            PlanNode::new(NodeKind::Motion {
                motion_type: MotionType::Gather,
            })
            .with_children(vec![scan]),
        );
        let root = arena.add(PlanNode::new(NodeKind::Append).with_children(vec![gather, gather]));
        let stmt = PlannedStmt::new(arena, root, range_table());

        assert_eq!(pass().assign(&stmt), Err(DispatchError::SharedNode(gather)));
    }

    #[test]
    fn test_diamond_is_shared() {
        let mut arena = PlanArena::new();
        let scan = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 1 }).with_qual(k_eq(5)));
        let left = arena.add(PlanNode::new(NodeKind::Sort).with_children(vec![scan]));
        let right = arena.add(PlanNode::new(NodeKind::Material).with_children(vec![scan]));
        let root = arena.add(PlanNode::new(NodeKind::Append).with_children(vec![left, right]));
        let stmt = PlannedStmt::new(arena, root, range_table());

        assert_eq!(pass().assign(&stmt), Err(DispatchError::SharedNode(scan)));
    }

    #[test]
    fn test_stacked_diamonds_fail_fast() {
        // Each level lists the level below twice; walking it as a tree would
        // visit the bottom scan 2^24 times.
        let mut arena = PlanArena::new();
        let mut top = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 1 }));
        for _ in 0..24 {
            top = arena.add(PlanNode::new(NodeKind::Append).with_children(vec![top, top]));
        }
        let stmt = PlannedStmt::new(arena, top, range_table());

        assert!(matches!(
            pass().assign(&stmt),
            Err(DispatchError::SharedNode(_))
        ));
    }

    #[test]
    fn test_subplans_may_share_a_plan() {
        let mut arena = PlanArena::new();
        let scan = arena.add(PlanNode::new(NodeKind::SeqScan { scan_rel: 1 }).with_qual(k_eq(5)));
        let sort = arena.add(PlanNode::new(NodeKind::Sort).with_children(vec![scan]));
        let first = arena.add(PlanNode::new(NodeKind::SubPlan {
            plan: sort,
            is_init_plan: false,
            args: vec![],
        }));
        let second = arena.add(PlanNode::new(NodeKind::SubPlan {
            plan: sort,
            is_init_plan: false,
            args: vec![],
        }));
        let root = arena.add(
            PlanNode::new(NodeKind::Result)
                .with_target_list(vec![Expr::SubPlan(first), Expr::SubPlan(second)]),
        );
        let stmt = PlannedStmt::new(arena, root, range_table());

        let ann = pass().assign(&stmt).unwrap();
        assert_eq!(ann.decision(root), Some(&DispatchDecision::to_segments([seg_of(5)])));
        assert!(ann.decision(first).is_some());
        assert!(ann.decision(second).is_some());
        assert_eq!(ann.slice_roots, vec![root]);
    }

    #[test]
    fn test_dangling_child() {
        let mut arena = PlanArena::new();
        let root = arena.add(PlanNode::new(NodeKind::Agg).with_children(vec![NodeId(9)]));
        let stmt = PlannedStmt::new(arena, root, range_table());

        assert_eq!(
            pass().assign(&stmt),
            Err(DispatchError::DanglingNode(NodeId(9)))
        );
    }
}
