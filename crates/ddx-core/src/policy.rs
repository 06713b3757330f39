//! # Distribution Policies
//!
//! A distribution policy describes how a table's rows are spread across the
//! segments of the cluster. It is what makes direct dispatch possible at all:
//!
//! - **Hashed**: each row lives on the segment its key columns hash to. If a
//!   predicate pins every key column to a small set of constants, the pass can
//!   compute exactly which segments hold matching rows.
//! - **Random**: rows are placed round-robin. Only a predicate on the segment-id
//!   pseudo-column can narrow dispatch.
//! - **Replicated**: every segment holds a full copy. Never pruned.
//!
//! ## Hash Operator Families
//!
//! Each key column is hashed with the hash function of its operator family. A
//! literal can only be hashed by a family that accepts its type; the default
//! oracle treats an equality against an incompatible literal as no information.

use crate::expr::{ColumnRef, ScalarValue};
use serde::{Deserialize, Serialize};

/// Name of the pseudo-column exposing the segment a row is stored on.
pub const SEGMENT_ID_COLUMN: &str = "gp_segment_id";

/// Ordinal of the segment-id pseudo-column. System columns use negative
/// attribute numbers; this is stored as its two's-complement `u32`.
pub const SEGMENT_ID_INDEX: u32 = u32::MAX - 7;

/// Hash operator family of a distribution key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashOpFamily {
    Integer,
    Float,
    Text,
    Bool,
    Date,
}

impl HashOpFamily {
    /// Whether a literal of this type can be hashed by this family. NULL is
    /// accepted by every family.
    pub fn accepts(&self, value: &ScalarValue) -> bool {
        matches!(
            (self, value),
            (_, ScalarValue::Null)
                | (HashOpFamily::Integer, ScalarValue::Int64(_))
                | (HashOpFamily::Float, ScalarValue::Float64(_))
                | (HashOpFamily::Text, ScalarValue::Utf8(_))
                | (HashOpFamily::Bool, ScalarValue::Bool(_))
                | (HashOpFamily::Date, ScalarValue::Date(_))
        )
    }

    /// Stable numeric tag, used to seed the default hasher.
    pub fn tag(&self) -> u64 {
        match self {
            HashOpFamily::Integer => 1,
            HashOpFamily::Float => 2,
            HashOpFamily::Text => 3,
            HashOpFamily::Bool => 4,
            HashOpFamily::Date => 5,
        }
    }
}

/// One column of a hash distribution key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistributionKey {
    pub column: ColumnRef,
    pub opfamily: HashOpFamily,
}

/// How a table's rows are assigned to segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionPolicy {
    /// Round-robin placement; no data-locality guarantees.
    Random { num_segments: usize },
    /// Hash-partitioned on the given key columns, in key order.
    Hashed {
        keys: Vec<DistributionKey>,
        num_segments: usize,
    },
    /// Every segment has a full copy.
    Replicated { num_segments: usize },
}

impl DistributionPolicy {
    pub fn hashed(keys: Vec<DistributionKey>, num_segments: usize) -> Self {
        DistributionPolicy::Hashed { keys, num_segments }
    }

    /// Number of segments the table is spread over.
    pub fn num_segments(&self) -> usize {
        match self {
            DistributionPolicy::Random { num_segments }
            | DistributionPolicy::Hashed { num_segments, .. }
            | DistributionPolicy::Replicated { num_segments } => *num_segments,
        }
    }

    /// Rows are split across segments (hash or random), so each segment holds
    /// only part of the table.
    pub fn is_partitioned(&self) -> bool {
        !matches!(self, DistributionPolicy::Replicated { .. })
    }

    /// Hash-partitioned on at least one key column. A hashed policy without
    /// key columns places rows like a random one.
    pub fn is_hash_partitioned(&self) -> bool {
        matches!(self, DistributionPolicy::Hashed { keys, .. } if !keys.is_empty())
    }

    /// Distribution key columns; empty unless hash-partitioned.
    pub fn keys(&self) -> &[DistributionKey] {
        match self {
            DistributionPolicy::Hashed { keys, .. } => keys,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::OrderedFloat;

    #[test]
    fn test_opfamily_accepts_matching_types_and_null() {
        assert!(HashOpFamily::Integer.accepts(&ScalarValue::Int64(3)));
        assert!(HashOpFamily::Integer.accepts(&ScalarValue::Null));
        assert!(!HashOpFamily::Integer.accepts(&ScalarValue::Utf8("3".into())));
        assert!(HashOpFamily::Float.accepts(&ScalarValue::Float64(OrderedFloat(1.5))));
        assert!(!HashOpFamily::Date.accepts(&ScalarValue::Int64(10)));
    }

    #[test]
    fn test_policy_partitioning() {
        let key = DistributionKey {
            column: ColumnRef::new(None, "id", 0),
            opfamily: HashOpFamily::Integer,
        };
        let hashed = DistributionPolicy::hashed(vec![key], 4);
        assert!(hashed.is_partitioned());
        assert!(hashed.is_hash_partitioned());
        assert_eq!(hashed.keys().len(), 1);

        let random = DistributionPolicy::Random { num_segments: 4 };
        assert!(random.is_partitioned());
        assert!(!random.is_hash_partitioned());
        assert!(random.keys().is_empty());

        let replicated = DistributionPolicy::Replicated { num_segments: 4 };
        assert!(!replicated.is_partitioned());
        assert_eq!(replicated.num_segments(), 4);
    }

    #[test]
    fn test_hashed_without_keys_is_not_hash_partitioned() {
        let keyless = DistributionPolicy::hashed(vec![], 4);
        assert!(keyless.is_partitioned());
        assert!(!keyless.is_hash_partitioned());
    }
}
