//! Shared test utilities for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::Notify;

use chat_atlas::{
    BackendPort, CachePort, ChatIndex, IndexConfig, LogEntry, LogSummary, RawTurn,
};

/// Build a raw backend turn. Roles alternate user/assistant by ordinal.
pub fn raw_turn(ordinal: usize, text: &str, ts_secs: Option<i64>) -> RawTurn {
    RawTurn {
        role: if ordinal % 2 == 0 { "user".to_string() } else { "assistant".to_string() },
        text: Some(text.to_string()),
        timestamp: ts_secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        variants: Vec::new(),
        active_variant: None,
    }
}

/// Turns from plain texts, timestamped one second apart starting at `base`.
pub fn turns_from(base: i64, texts: &[&str]) -> Vec<RawTurn> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| raw_turn(i, text, Some(base + i as i64)))
        .collect()
}

struct MockLog {
    summary: LogSummary,
    turns: Vec<RawTurn>,
}

/// Scriptable in-memory backend.
///
/// Fetches can be counted, ordered, held open (to interleave index mutations
/// with an in-flight fetch) or failed, which is enough to script every race
/// the scheduler has to survive.
pub struct MockBackend {
    logs: Mutex<HashMap<String, Vec<MockLog>>>,
    fetch_counts: Mutex<HashMap<String, usize>>,
    fetch_order: Mutex<Vec<String>>,
    held: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    fail_list: Mutex<bool>,
    started_tx: UnboundedSender<String>,
    started_rx: Mutex<Option<UnboundedReceiver<String>>>,
    release: Notify,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let (started_tx, started_rx) = unbounded_channel();
        Arc::new(Self {
            logs: Mutex::new(HashMap::new()),
            fetch_counts: Mutex::new(HashMap::new()),
            fetch_order: Mutex::new(Vec::new()),
            held: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            fail_list: Mutex::new(false),
            started_tx,
            started_rx: Mutex::new(Some(started_rx)),
            release: Notify::new(),
        })
    }

    /// Create or replace a log. Revision and content are set together, the
    /// way a real backend would report a rewritten log.
    pub fn set_log(&self, subject: &str, name: &str, revision: u64, turns: Vec<RawTurn>) {
        let last_ts = turns.iter().rev().find_map(|t| t.timestamp);
        let summary = LogSummary {
            name: name.to_string(),
            revision,
            approx_count: Some(turns.len()),
            last_turn_timestamp: last_ts,
        };
        let mut logs = self.logs.lock().unwrap();
        let subject_logs = logs.entry(subject.to_string()).or_default();
        subject_logs.retain(|l| l.summary.name != name);
        subject_logs.push(MockLog { summary, turns });
    }

    pub fn remove_log(&self, subject: &str, name: &str) {
        if let Some(subject_logs) = self.logs.lock().unwrap().get_mut(subject) {
            subject_logs.retain(|l| l.summary.name != name);
        }
    }

    /// Make fetches of `name` block until [`release_all`](Self::release_all).
    pub fn hold(&self, name: &str) {
        self.held.lock().unwrap().insert(name.to_string());
    }

    pub fn unhold(&self, name: &str) {
        self.held.lock().unwrap().remove(name);
    }

    pub fn release_all(&self) {
        self.release.notify_waiters();
    }

    pub fn fail_fetch(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn clear_fetch_failure(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    pub fn fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    /// Receiver reporting each held fetch the moment it blocks.
    pub fn take_started_rx(&self) -> UnboundedReceiver<String> {
        self.started_rx.lock().unwrap().take().expect("started receiver already taken")
    }

    pub fn fetch_count(&self, name: &str) -> usize {
        self.fetch_counts.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn fetch_order(&self) -> Vec<String> {
        self.fetch_order.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendPort for MockBackend {
    async fn list_logs(&self, subject: &str) -> Result<Vec<LogSummary>> {
        if *self.fail_list.lock().unwrap() {
            bail!("simulated list failure");
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(subject)
            .map(|logs| logs.iter().map(|l| l.summary.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_log(&self, subject: &str, name: &str) -> Result<Vec<RawTurn>> {
        *self.fetch_counts.lock().unwrap().entry(name.to_string()).or_default() += 1;
        self.fetch_order.lock().unwrap().push(name.to_string());

        let held = self.held.lock().unwrap().contains(name);
        if held {
            // Register interest before announcing, so a release sent right
            // after the announcement cannot be missed.
            let released = self.release.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            let _ = self.started_tx.send(name.to_string());
            released.await;
        }

        if self.failing.lock().unwrap().contains(name) {
            bail!("simulated fetch failure for {}", name);
        }

        self.logs
            .lock()
            .unwrap()
            .get(subject)
            .and_then(|logs| logs.iter().find(|l| l.summary.name == name))
            .map(|l| l.turns.clone())
            .with_context(|| format!("no such log {}/{}", subject, name))
    }
}

/// Recording in-memory cache.
#[derive(Default)]
pub struct MockCache {
    entries: Mutex<HashMap<(String, String), LogEntry>>,
    writes: Mutex<Vec<(String, String)>>,
    deletes: Mutex<Vec<(String, String)>>,
}

impl MockCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pre-populate a cached hydrated entry.
    pub fn seed(&self, subject: &str, entry: LogEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert((subject.to_string(), entry.name.clone()), entry);
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }
}

impl CachePort for MockCache {
    fn read_all(&self, subject: &str) -> Result<HashMap<String, LogEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|((s, _), _)| s == subject)
            .map(|((_, name), entry)| (name.clone(), entry.clone()))
            .collect())
    }

    fn write(&self, subject: &str, entry: &LogEntry) -> Result<()> {
        let key = (subject.to_string(), entry.name.clone());
        self.writes.lock().unwrap().push(key.clone());
        self.entries.lock().unwrap().insert(key, entry.clone());
        Ok(())
    }

    fn delete(&self, subject: &str, name: &str) -> Result<()> {
        let key = (subject.to_string(), name.to_string());
        self.deletes.lock().unwrap().push(key.clone());
        self.entries.lock().unwrap().remove(&key);
        Ok(())
    }
}

/// Hydrated cache entry as a previous run would have persisted it.
pub fn cached_entry(name: &str, revision: u64, base_ts: i64, texts: &[&str]) -> LogEntry {
    let raw = turns_from(base_ts, texts);
    let messages = chat_atlas::parse_turns(name, &raw);
    let mut entry = LogEntry {
        name: name.to_string(),
        last_modified: revision,
        message_count: 0,
        messages: Vec::new(),
        first_timestamp: None,
        last_timestamp: None,
        sort_timestamp: LogEntry::epoch(),
        insertion_order: 0,
        diverges_at: None,
        hydrated: false,
        tags: Vec::new(),
    };
    entry.apply_content(messages);
    entry
}

pub fn index_with(backend: Arc<MockBackend>, cache: Arc<MockCache>) -> Arc<ChatIndex> {
    let _ = env_logger::builder().is_test(true).try_init();
    ChatIndex::new(backend, cache, IndexConfig::default())
}

/// Wait until background hydration settles (queue and in-flight both empty).
pub async fn wait_for_hydration(index: &Arc<ChatIndex>) {
    for _ in 0..400 {
        if index.is_hydration_complete() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("hydration did not settle in time");
}

/// Wait until one specific entry is hydrated.
pub async fn wait_for_entry(index: &Arc<ChatIndex>, name: &str) {
    for _ in 0..400 {
        if index.get(name).is_some_and(|e| e.hydrated) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("entry {} did not hydrate in time", name);
}
