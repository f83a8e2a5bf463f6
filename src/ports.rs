//! Contracts for the external collaborators the index depends on.
//!
//! The index never talks to the outside world directly: the host application
//! injects a [`BackendPort`] (the source of truth for which logs exist and
//! what they contain) and a [`CachePort`] (a best-effort accelerator that is
//! allowed to be stale, missing or corrupt). Cache failures must behave as
//! misses; they are never surfaced to callers of the index.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::LogEntry;
use crate::parsers::RawTurn;

/// One log as the backend lists it: identity and revision, plus optional
/// metadata that is cheaper (and possibly fresher) than full content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSummary {
    pub name: String,
    /// Comparable revision marker. A change invalidates hydrated content.
    pub revision: u64,
    #[serde(default, rename = "approxCount")]
    pub approx_count: Option<usize>,
    #[serde(default, rename = "lastTurnTimestamp")]
    pub last_turn_timestamp: Option<DateTime<Utc>>,
}

/// Source of truth for logs of a subject. Supplied by the host.
#[async_trait]
pub trait BackendPort: Send + Sync {
    /// List every log the backend knows for `subject`.
    async fn list_logs(&self, subject: &str) -> Result<Vec<LogSummary>>;

    /// Fetch the full ordered turn sequence of one log.
    async fn fetch_log(&self, subject: &str, name: &str) -> Result<Vec<RawTurn>>;
}

/// Best-effort persistent store of hydrated entries, keyed subject → log name.
///
/// Implementations are called off the interactive path; writes are
/// fire-and-forget from the index's point of view.
pub trait CachePort: Send + Sync {
    /// Bulk-read every cached entry for a subject.
    fn read_all(&self, subject: &str) -> Result<HashMap<String, LogEntry>>;

    fn write(&self, subject: &str, entry: &LogEntry) -> Result<()>;

    fn delete(&self, subject: &str, name: &str) -> Result<()>;
}

/// Cache that never hits, for hosts that opt out of persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl CachePort for NullCache {
    fn read_all(&self, _subject: &str) -> Result<HashMap<String, LogEntry>> {
        Ok(HashMap::new())
    }

    fn write(&self, _subject: &str, _entry: &LogEntry) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _subject: &str, _name: &str) -> Result<()> {
        Ok(())
    }
}
