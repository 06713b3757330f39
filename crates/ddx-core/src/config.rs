//! Tuning knobs for the direct-dispatch pass.

use serde::{Deserialize, Serialize};

/// Configuration for `DirectDispatchPass`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Hash-path narrowing is attempted only while the number of key-value
    /// combinations stays below `num_segments * combination_factor`.
    pub combination_factor: usize,
    /// Plans with more slice roots than this fall back to full dispatch on
    /// every slice. Multi-slice plans with narrowed dispatch can hang (MPP-7630).
    pub max_direct_dispatch_slices: usize,
    /// Recursion limit for the plan walk.
    pub max_plan_depth: usize,
    /// Log one `info!` line per finalized slice describing the decision.
    pub print_dispatch_decisions: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            combination_factor: 3,
            max_direct_dispatch_slices: 2,
            max_plan_depth: 1024,
            print_dispatch_decisions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.combination_factor, 3);
        assert_eq!(config.max_direct_dispatch_slices, 2);
        assert_eq!(config.max_plan_depth, 1024);
        assert!(!config.print_dispatch_decisions);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: DispatchConfig =
            serde_json::from_str(r#"{"printDispatchDecisions": true}"#).unwrap();
        assert!(config.print_dispatch_decisions);
        assert_eq!(config.combination_factor, 3);
    }
}
