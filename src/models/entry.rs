use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::turn::LogTurn;

/// Index entry for one conversation log.
///
/// Created in metadata-only form as soon as the backend reports the log
/// exists, promoted to hydrated form once content arrives. Readers only ever
/// see entries through snapshots; all mutation goes through the index store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub name: String,
    /// Revision marker from the backend. Opaque but comparable; a mismatch
    /// against the backend list invalidates hydrated content.
    pub last_modified: u64,
    pub message_count: usize,
    /// Empty until hydrated.
    #[serde(default)]
    pub messages: Vec<LogTurn>,
    #[serde(default)]
    pub first_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Stable recency key. Falls back to the Unix epoch when the log carries
    /// no timestamp at all, so ordering stays total.
    pub sort_timestamp: DateTime<Utc>,
    /// Tie-breaker assigned at insertion so list order does not jitter while
    /// entries are still loading. Not persisted; reassigned on adoption.
    #[serde(skip)]
    pub insertion_order: u64,
    /// Turn index where this log diverges from the detected reference log.
    /// Reset whenever the reference changes or content is invalidated.
    #[serde(skip)]
    pub diverges_at: Option<usize>,
    #[serde(default)]
    pub hydrated: bool,
    /// Labels attached by the annotation source; independent of content.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LogEntry {
    /// Attach hydrated content and recompute every content-derived field.
    pub fn apply_content(&mut self, messages: Vec<LogTurn>) {
        self.message_count = messages.len();
        self.messages = messages;
        self.hydrated = true;
        self.recompute_timestamps();
    }

    /// Drop hydrated content, keeping metadata and tags. The entry becomes
    /// eligible for hydration again.
    pub fn invalidate_content(&mut self) {
        self.messages.clear();
        self.hydrated = false;
        self.diverges_at = None;
    }

    /// Recompute first/last/sort timestamps from the message sequence.
    /// Messages without timestamps are skipped; an entry whose messages carry
    /// none keeps its previous sort key.
    pub fn recompute_timestamps(&mut self) {
        self.first_timestamp = self.messages.iter().find_map(|m| m.timestamp);
        self.last_timestamp = self.messages.iter().rev().find_map(|m| m.timestamp);
        if let Some(last) = self.last_timestamp {
            self.sort_timestamp = last;
        }
    }

    /// Revision derived from content alone: the last turn's timestamp in
    /// Unix milliseconds. `None` when no turn carries a timestamp.
    pub fn revision_from_content(messages: &[LogTurn]) -> Option<u64> {
        messages
            .iter()
            .rev()
            .find_map(|m| m.timestamp)
            .map(|ts| ts.timestamp_millis().max(0) as u64)
    }

    /// Fallback sort key for entries with no timestamp anywhere.
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }
}
