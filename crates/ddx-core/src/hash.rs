//! # Segment Hashing
//!
//! Narrowing through the hash path is only sound if the pass maps a tuple of
//! key values to exactly the segment the storage layer put the row on. The
//! mapping is therefore behind the `SegmentHasher` trait: a deployment plugs in
//! the same function its storage uses.
//!
//! ## Default Hasher
//!
//! `JumpConsistentHasher` is the mapping used by this crate's own storage
//! conventions (and by the tests):
//!
//! 1. Each non-NULL key value is turned into canonical bytes and hashed with
//!    xxh3, seeded by its operator family tag. NULL values are skipped, so they
//!    leave the running hash unchanged.
//! 2. Per-column hashes are folded in key order: `h = rotl(h, 1) ^ column_hash`.
//! 3. The 64-bit result is reduced to `0..num_segments` with jump consistent
//!    hashing (Lamping & Veach), which keeps most rows in place when the
//!    cluster grows.

use crate::decision::SegmentId;
use crate::expr::ScalarValue;
use crate::policy::HashOpFamily;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Maps distribution-key tuples to segments.
pub trait SegmentHasher: Send + Sync {
    /// Segment holding rows whose key columns equal `values` (in key order).
    fn hash_segment(
        &self,
        values: &[ScalarValue],
        opfamilies: &[HashOpFamily],
        num_segments: usize,
    ) -> SegmentId;

    /// A fixed, arbitrary segment for slices that produce no rows.
    fn random_segment(&self, num_segments: usize) -> SegmentId;
}

/// Seed for `random_segment`; any constant keeps the pass deterministic.
const FALLBACK_SEGMENT_KEY: u64 = 0x9e37_79b9_7f4a_7c15;

/// Default xxh3 + jump consistent hash mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct JumpConsistentHasher;

impl SegmentHasher for JumpConsistentHasher {
    fn hash_segment(
        &self,
        values: &[ScalarValue],
        opfamilies: &[HashOpFamily],
        num_segments: usize,
    ) -> SegmentId {
        let mut h: u64 = 0;
        for (value, family) in values.iter().zip(opfamilies) {
            if let Some(bytes) = canonical_bytes(value) {
                h = h.rotate_left(1) ^ xxh3_64_with_seed(&bytes, family.tag());
            }
        }
        jump_consistent_hash(h, num_segments)
    }

    fn random_segment(&self, num_segments: usize) -> SegmentId {
        jump_consistent_hash(FALLBACK_SEGMENT_KEY, num_segments)
    }
}

/// Byte image of a value for hashing; `None` for NULL.
fn canonical_bytes(value: &ScalarValue) -> Option<Vec<u8>> {
    match value {
        ScalarValue::Null => None,
        ScalarValue::Bool(v) => Some(vec![u8::from(*v)]),
        ScalarValue::Int64(v) => Some(v.to_le_bytes().to_vec()),
        ScalarValue::Float64(v) => {
            // -0.0 == 0.0 and all NaNs are equal under the float family's
            // equality, so they must hash alike.
            let f = if v.0 == 0.0 {
                0.0
            } else if v.0.is_nan() {
                f64::NAN
            } else {
                v.0
            };
            Some(f.to_bits().to_le_bytes().to_vec())
        }
        ScalarValue::Utf8(v) => Some(v.as_bytes().to_vec()),
        ScalarValue::Date(v) => Some(v.to_le_bytes().to_vec()),
    }
}

/// Jump consistent hash: maps `key` to a bucket in `0..num_buckets`.
fn jump_consistent_hash(mut key: u64, num_buckets: usize) -> SegmentId {
    if num_buckets <= 1 {
        return 0;
    }
    let num_buckets = num_buckets as i64;
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < num_buckets {
        b = j;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        j = ((b + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as SegmentId
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::OrderedFloat;

    #[test]
    fn test_hash_is_deterministic_and_in_range() {
        let h = JumpConsistentHasher;
        for v in 0..200 {
            let values = [ScalarValue::Int64(v)];
            let a = h.hash_segment(&values, &[HashOpFamily::Integer], 7);
            let b = h.hash_segment(&values, &[HashOpFamily::Integer], 7);
            assert_eq!(a, b);
            assert!(a < 7);
        }
    }

    #[test]
    fn test_hash_spreads_over_segments() {
        let h = JumpConsistentHasher;
        let mut seen = std::collections::BTreeSet::new();
        for v in 0..500 {
            seen.insert(h.hash_segment(&[ScalarValue::Int64(v)], &[HashOpFamily::Integer], 4));
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_signed_zero_hashes_alike() {
        let h = JumpConsistentHasher;
        let pos = h.hash_segment(
            &[ScalarValue::Float64(OrderedFloat(0.0))],
            &[HashOpFamily::Float],
            16,
        );
        let neg = h.hash_segment(
            &[ScalarValue::Float64(OrderedFloat(-0.0))],
            &[HashOpFamily::Float],
            16,
        );
        assert_eq!(pos, neg);
    }

    #[test]
    fn test_single_segment_and_fallback() {
        let h = JumpConsistentHasher;
        assert_eq!(
            h.hash_segment(&[ScalarValue::Int64(42)], &[HashOpFamily::Integer], 1),
            0
        );
        assert_eq!(h.random_segment(0), 0);
        assert!(h.random_segment(5) < 5);
        assert_eq!(h.random_segment(5), h.random_segment(5));
    }
}
