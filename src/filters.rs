//! Presentation-side filtering and sorting of index snapshots.
//!
//! Filter logic:
//! - Tags OR within themselves: an entry passes with any one of the
//!   requested tags
//! - Cross-criteria AND: tag match, date range and message-count range must
//!   all hold
//!
//! Filtering is a pure function of a snapshot and is always safe to
//! recompute; it is cheap relative to hydration, so nothing here caches.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::ordering::canonical_cmp;
use crate::models::LogEntry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    /// Entry passes when it carries any one of these (case-insensitive).
    /// Empty means "no tag constraint".
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inclusive lower bound on recency.
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on recency.
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_messages: Option<usize>,
    #[serde(default)]
    pub max_messages: Option<usize>,
}

impl EntryFilter {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.after.is_none()
            && self.before.is_none()
            && self.min_messages.is_none()
            && self.max_messages.is_none()
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.tags.is_empty() {
            let any_tag = self
                .tags
                .iter()
                .any(|want| entry.tags.iter().any(|have| have.eq_ignore_ascii_case(want)));
            if !any_tag {
                return false;
            }
        }
        if let Some(after) = self.after {
            if entry.sort_timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if entry.sort_timestamp > before {
                return false;
            }
        }
        if let Some(min) = self.min_messages {
            if entry.message_count < min {
                return false;
            }
        }
        if let Some(max) = self.max_messages {
            if entry.message_count > max {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Canonical recency order (the default list order).
    #[default]
    Recency,
    Name,
    MessageCount,
}

/// Apply a filter to a snapshot, keeping order.
pub fn apply_filter(entries: Vec<Arc<LogEntry>>, filter: &EntryFilter) -> Vec<Arc<LogEntry>> {
    if filter.is_empty() {
        return entries;
    }
    entries.into_iter().filter(|entry| filter.matches(entry)).collect()
}

/// Order a snapshot by the chosen field, falling back to the canonical
/// comparator so every sort is total and deterministic.
pub fn sort_entries(entries: &mut [Arc<LogEntry>], sort: SortField) {
    match sort {
        SortField::Recency => entries.sort_by(|a, b| canonical_cmp(a, b)),
        SortField::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
        SortField::MessageCount => entries.sort_by(|a, b| {
            b.message_count.cmp(&a.message_count).then_with(|| canonical_cmp(a, b))
        }),
    }
}
