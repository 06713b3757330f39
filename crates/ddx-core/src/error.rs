//! # Errors
//!
//! The pass never rejects a query: every ambiguity degrades to full dispatch.
//! The errors here are internal defects, raised when the plan handed to the
//! pass is malformed or contains a node this pass has no rule for. They mean
//! the planner and this pass have drifted out of sync.

use crate::plan::{NodeId, RangeIndex};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// A node kind reached the walker that it has no rule for.
    #[error("Invalid plan node {node}: unrecognized kind '{tag}'")]
    UnrecognizedNode { node: NodeId, tag: String },
    /// A node id does not exist in the arena.
    #[error("Dangling plan node reference {0}")]
    DanglingNode(NodeId),
    /// A node is listed as a child (or expression sub-select) of more than one
    /// parent, or more than once by the same parent. Only `SubPlan::plan` may
    /// refer to a subtree that is reached elsewhere.
    #[error("Plan node {0} is shared between parents")]
    SharedNode(NodeId),
    /// A scan refers to a range-table entry that does not exist.
    #[error("Scan {node} refers to missing range table entry {index}")]
    MissingRangeEntry { node: NodeId, index: RangeIndex },
    /// The plan is deeper than the configured limit (or cyclic).
    #[error("Plan depth exceeds limit of {limit}")]
    DepthExceeded { limit: usize },
    /// Slice accumulators were not pushed and popped in pairs.
    #[error("Unbalanced slice stack")]
    UnbalancedSliceStack,
}
