use serde::{Deserialize, Serialize};

/// Snapshot of hydration progress, published after every completed batch.
///
/// `loaded` counts hydrated entries, `total` counts all entries known for the
/// current subject. Within one hydration session `loaded` only grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationProgress {
    pub loaded: usize,
    pub total: usize,
}

/// Aggregate counts over the current index. Recomputed per call; cheap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub entries: usize,
    pub hydrated: usize,
    pub messages: usize,
}
