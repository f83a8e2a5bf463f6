use std::cmp::Ordering;

use crate::models::LogEntry;

/// Canonical comparator for entry lists: most recent first, then insertion
/// order, then name. The two tie-breakers keep list order deterministic and
/// jitter-free while entries are still loading and timestamps arrive out of
/// order.
pub fn canonical_cmp(a: &LogEntry, b: &LogEntry) -> Ordering {
    b.sort_timestamp
        .cmp(&a.sort_timestamp)
        .then_with(|| a.insertion_order.cmp(&b.insertion_order))
        .then_with(|| a.name.cmp(&b.name))
}
