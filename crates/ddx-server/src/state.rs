//! # Application State
//!
//! Shared by all request handlers via `Arc`. The catalog is not part of the
//! state: every `/annotate` request carries the catalog snapshot its plan was
//! built against, so a fresh `DirectDispatchPass` is assembled per request from
//! the request's catalog and the shared collaborators below.

use ddx_core::hash::{JumpConsistentHasher, SegmentHasher};
use ddx_core::value_set::{DefaultValueSetOracle, ValueSetOracle};
use ddx_core::DispatchConfig;
use std::sync::Arc;

pub struct AppState {
    /// Predicate oracle used for every request.
    pub oracle: Arc<dyn ValueSetOracle>,
    /// Must match the storage layer's row-to-segment mapping.
    pub hasher: Arc<dyn SegmentHasher>,
    pub config: DispatchConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            oracle: Arc::new(DefaultValueSetOracle),
            hasher: Arc::new(JumpConsistentHasher),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_uses_default_collaborators() {
        let state = AppState::default();
        assert_eq!(state.config, DispatchConfig::default());
        assert_eq!(
            state.hasher.random_segment(8),
            JumpConsistentHasher.random_segment(8)
        );
    }
}
