use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Percentage-rollout feature flag. Written by an out-of-scope admin
/// workflow, read-mostly by the dispatch core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: String,
    pub enabled: bool,
    pub rollout_percentage: u8,
    pub allowlist: HashSet<String>,
}

impl FeatureFlag {
    pub fn new(key: String, enabled: bool, rollout_percentage: u8) -> Self {
        Self {
            key,
            enabled,
            rollout_percentage: rollout_percentage.min(100),
            allowlist: HashSet::new(),
        }
    }
}
