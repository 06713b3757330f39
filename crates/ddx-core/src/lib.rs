//! # ddx-core: Direct-Dispatch Planning Pass
//!
//! This crate implements the pass that runs after a distributed plan has been
//! finalized and before it is dispatched to the worker segments. It walks the
//! plan and annotates every slice root with the smallest set of segments that
//! can provably hold rows the slice cares about, so the dispatcher can skip the
//! rest of the cluster.
//!
//! The pass may only *narrow* dispatch. Any doubt (an unsupported predicate, a
//! non-constant value, a missing policy, too many key combinations) resolves to
//! full dispatch.
//!
//! ## Module Overview
//!
//! - **`expr`**: Scalar expression model used in quals and target lists.
//! - **`plan`**: Caller-owned plan arena, node kinds, and the range table.
//! - **`policy`**: Table distribution policies (hash, random, replicated).
//! - **`catalog`**: Catalog trait for distribution policy lookups.
//! - **`value_set`**: Possible-value-set oracle trait and a default implementation.
//! - **`hash`**: Segment hasher trait and the default jump-consistent hasher.
//! - **`decision`**: Dispatch decisions, per-slice accumulators, and the merge lattice.
//! - **`resolver`**: Per-scan dispatch resolution from quals and policy.
//! - **`walker`**: The plan walker, slice finalization, and the multi-slice guard.
//! - **`config`**: Tuning knobs for the pass.
//! - **`error`**: Internal-defect errors raised on malformed plans.

pub mod catalog;
pub mod config;
pub mod decision;
pub mod error;
pub mod expr;
pub mod hash;
pub mod plan;
pub mod policy;
pub mod resolver;
pub mod value_set;
pub mod walker;

pub use config::DispatchConfig;
pub use decision::{DispatchDecision, SegmentId};
pub use error::DispatchError;
pub use walker::{DirectDispatchPass, DispatchAnnotations};
