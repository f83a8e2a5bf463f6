use serde::{Deserialize, Serialize};

/// Number of logs fetched concurrently per hydration batch.
pub const DEFAULT_HYDRATION_BATCH: usize = 5;

/// Tuning knobs for an index instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Hydration batch size; clamped to at least 1 at construction.
    #[serde(default = "default_hydration_batch")]
    pub hydration_batch: usize,
}

fn default_hydration_batch() -> usize {
    DEFAULT_HYDRATION_BATCH
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { hydration_batch: DEFAULT_HYDRATION_BATCH }
    }
}
