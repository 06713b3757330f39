//! # Dispatch Decisions
//!
//! A `DispatchDecision` says where a slice must run:
//!
//! | `direct` | `segments`  | meaning                                          |
//! |----------|-------------|--------------------------------------------------|
//! | `false`  | (ignored)   | dispatch to every segment                        |
//! | `true`   | `None`      | any single segment will do (no rows can qualify) |
//! | `true`   | `Some(S)`   | dispatch exactly to `S`                          |
//!
//! ## Accumulators and the Merge Lattice
//!
//! While the walker is inside a slice, every scan in that slice contributes a
//! decision, and the contributions are folded into the slice's `Accumulator`
//! with `merge`. The lattice is ordered "no information" < "no rows" <
//! "segments S" < "everywhere", and `merge` is its join: set union on segment
//! sets, with full dispatch absorbing everything. Because it is a join, the
//! result does not depend on the order in which the walker visits scans.
//!
//! ## Slice Stack
//!
//! The walker keeps one accumulator per open slice on a `SliceStack`. Entering a
//! slice-opening node pushes a fresh accumulator; leaving it pops it for
//! finalization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Id of a segment (worker) in the cluster.
pub type SegmentId = u32;

/// Where a slice must be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub direct: bool,
    pub segments: Option<BTreeSet<SegmentId>>,
}

impl DispatchDecision {
    /// Dispatch to every segment.
    pub fn full() -> Self {
        Self {
            direct: false,
            segments: None,
        }
    }

    /// Dispatch to exactly `segments`.
    pub fn to_segments(segments: impl IntoIterator<Item = SegmentId>) -> Self {
        Self {
            direct: true,
            segments: Some(segments.into_iter().collect()),
        }
    }

    /// No rows can qualify; any one segment will do.
    pub fn no_rows() -> Self {
        Self {
            direct: true,
            segments: None,
        }
    }

    pub fn is_full(&self) -> bool {
        !self.direct
    }

    /// The segment set, if this is a direct decision with an explicit set.
    pub fn target_segments(&self) -> Option<&BTreeSet<SegmentId>> {
        if self.direct {
            self.segments.as_ref()
        } else {
            None
        }
    }
}

impl Default for DispatchDecision {
    fn default() -> Self {
        Self::full()
    }
}

impl fmt::Display for DispatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_segments() {
            _ if !self.direct => write!(f, "full"),
            None => write!(f, "any"),
            Some(segs) => {
                write!(f, "segments [")?;
                for (i, s) in segs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Scratch state for one open slice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Accumulator {
    pub decision: DispatchDecision,
    /// Whether any node in the slice has contributed information yet.
    pub initialized: bool,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An accumulator holding one contribution.
    pub fn from_decision(decision: DispatchDecision) -> Self {
        Self {
            decision,
            initialized: true,
        }
    }

    /// Fold a contribution into this accumulator.
    pub fn merge(&mut self, from: &DispatchDecision) {
        if !from.direct {
            // Full dispatch dominates.
            self.decision = DispatchDecision::full();
        } else if !self.initialized {
            self.decision = from.clone();
        } else if !self.decision.direct {
            // Cannot get better.
        } else if from.segments.is_none() {
            // Contributes no rows.
        } else if self.decision.segments.is_none() {
            self.decision.segments = from.segments.clone();
        } else if let (Some(to), Some(more)) = (&mut self.decision.segments, &from.segments) {
            to.extend(more.iter().copied());
        }
        self.initialized = true;
    }
}

/// Stack of accumulators, one per open slice.
#[derive(Debug, Default)]
pub struct SliceStack {
    slices: Vec<Accumulator>,
}

impl SliceStack {
    /// A stack with the accumulator for the top slice already pushed.
    pub fn new() -> Self {
        Self {
            slices: vec![Accumulator::new()],
        }
    }

    pub fn push(&mut self) {
        self.slices.push(Accumulator::new());
    }

    pub fn pop(&mut self) -> Option<Accumulator> {
        self.slices.pop()
    }

    /// Merge a contribution into the innermost open slice. Returns `false` if
    /// no slice is open.
    pub fn merge_into_top(&mut self, from: &DispatchDecision) -> bool {
        match self.slices.last_mut() {
            Some(top) => {
                top.merge(from);
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.slices.len()
    }
}
