//! # Catalog Interface
//!
//! The pass needs two facts from the catalog: the distribution policy of every
//! relation a scan reads, and the number of segments in the cluster (used to
//! pick a fallback segment for slices that provably produce no rows).
//!
//! ## Trait Design
//!
//! `Catalog` is a small trait behind `dyn Catalog` so that the planner's real
//! metadata cache can back it. Lookups are synchronous and read-only. For tests
//! and the HTTP service, `InMemoryCatalog` keeps policies in a HashMap keyed by
//! `schema.table`.
//!
//! A table missing from the catalog has no policy, which the resolver treats as
//! "no pruning possible".

use crate::expr::TableRef;
use crate::policy::DistributionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Catalog provides distribution metadata.
pub trait Catalog: Send + Sync {
    fn distribution_policy(&self, table: &TableRef) -> Option<DistributionPolicy>;
    fn num_segments(&self) -> usize;
}

/// In-memory catalog for testing and the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryCatalog {
    /// Distribution policies keyed by "schema.table".
    #[serde(default)]
    pub policies: HashMap<String, DistributionPolicy>,
    /// Number of segments in the cluster.
    pub num_segments: usize,
}

impl InMemoryCatalog {
    pub fn new(num_segments: usize) -> Self {
        Self {
            policies: HashMap::new(),
            num_segments,
        }
    }

    pub fn add_table(&mut self, table: &TableRef, policy: DistributionPolicy) {
        self.policies.insert(table.to_string(), policy);
    }
}

impl Catalog for InMemoryCatalog {
    fn distribution_policy(&self, table: &TableRef) -> Option<DistributionPolicy> {
        self.policies.get(&table.to_string()).cloned()
    }

    fn num_segments(&self) -> usize {
        self.num_segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_qualified_name() {
        let mut catalog = InMemoryCatalog::new(8);
        let t = TableRef::new("public", "orders");
        catalog.add_table(&t, DistributionPolicy::Random { num_segments: 8 });

        assert_eq!(
            catalog.distribution_policy(&t),
            Some(DistributionPolicy::Random { num_segments: 8 })
        );
        assert!(catalog
            .distribution_policy(&TableRef::new("other", "orders"))
            .is_none());
        assert_eq!(catalog.num_segments(), 8);
    }
}
