use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::config::IndexConfig;
use crate::filters::{EntryFilter, SortField, apply_filter, sort_entries};
use crate::index::ordering::canonical_cmp;
use crate::models::{HydrationProgress, IndexStats, LogEntry};
use crate::parsers::{RawTurn, normalize_text, parse_turns};
use crate::ports::{BackendPort, CachePort, LogSummary};

/// Mutable index state. One subject at a time; every entry in `entries`
/// belongs to `subject`.
pub(crate) struct IndexState {
    pub(crate) subject: String,
    pub(crate) entries: HashMap<String, Arc<LogEntry>>,
    /// Strictly increasing; bumped on every observable mutation. Consumers
    /// key derived caches on this.
    pub(crate) version: u64,
    pub(crate) next_insertion: u64,
    /// Reference log of the last full branch-detection pass. `diverges_at`
    /// facts on entries are only meaningful relative to this name.
    pub(crate) branch_reference: Option<String>,
}

/// Hydration queue state. Guarded separately from [`IndexState`] so fetch
/// completions can requeue without touching the entry map; lock order is
/// always state before scheduler.
pub(crate) struct SchedulerState {
    pub(crate) queue: VecDeque<String>,
    pub(crate) queued: HashSet<String>,
    pub(crate) in_flight: HashSet<String>,
    /// Bumped on subject switch or reset; a worker holding a stale session
    /// id must exit without side effects.
    pub(crate) session: u64,
    pub(crate) worker_running: bool,
}

/// Incrementally maintained index of one subject's conversation logs.
///
/// Owns the name → entry map, reconciles it against the backend on
/// [`refresh`](ChatIndex::refresh), hydrates content in the background and
/// serves immutable snapshots to consumers. Constructed with injected
/// backend and cache collaborators so instances are independent; wrap in an
/// [`Arc`] to share with the hydration worker.
pub struct ChatIndex {
    pub(crate) backend: Arc<dyn BackendPort>,
    pub(crate) cache: Arc<dyn CachePort>,
    pub(crate) config: IndexConfig,
    pub(crate) state: Mutex<IndexState>,
    pub(crate) scheduler: Mutex<SchedulerState>,
    /// Serializes refreshes: at most one runs at a time.
    pub(crate) refresh_gate: tokio::sync::Mutex<()>,
    pub(crate) progress_tx: watch::Sender<HydrationProgress>,
    /// Self-handle for spawning the hydration worker from `&self` methods.
    pub(crate) self_ref: Weak<ChatIndex>,
}

impl ChatIndex {
    pub fn new(
        backend: Arc<dyn BackendPort>,
        cache: Arc<dyn CachePort>,
        config: IndexConfig,
    ) -> Arc<Self> {
        let config = IndexConfig { hydration_batch: config.hydration_batch.max(1) };
        let (progress_tx, _) = watch::channel(HydrationProgress::default());
        Arc::new_cyclic(|self_ref| Self {
            backend,
            cache,
            config,
            state: Mutex::new(IndexState {
                subject: String::new(),
                entries: HashMap::new(),
                version: 0,
                next_insertion: 0,
                branch_reference: None,
            }),
            scheduler: Mutex::new(SchedulerState {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                in_flight: HashSet::new(),
                session: 0,
                worker_running: false,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            progress_tx,
            self_ref: self_ref.clone(),
        })
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().expect("index state poisoned")
    }

    pub(crate) fn sched(&self) -> MutexGuard<'_, SchedulerState> {
        self.scheduler.lock().expect("scheduler state poisoned")
    }

    /// Reconcile the index against the backend's authoritative log list.
    ///
    /// Returns whether anything observable changed. A backend list failure
    /// propagates and leaves the index untouched. Switching subjects clears
    /// the map unconditionally and abandons in-flight hydration for the old
    /// subject. Returning is the "metadata ready" signal; content continues
    /// to hydrate in the background.
    pub async fn refresh(&self, subject: &str) -> Result<bool> {
        let _gate = self.refresh_gate.lock().await;

        let summaries = self
            .backend
            .list_logs(subject)
            .await
            .with_context(|| format!("failed to list logs for subject {}", subject))?;

        // Best-effort bulk cache read, off the async thread; any failure is
        // a miss.
        let cached = {
            let cache = Arc::clone(&self.cache);
            let subject = subject.to_string();
            tokio::task::spawn_blocking(move || cache.read_all(&subject))
                .await
                .unwrap_or_else(|e| {
                    log::debug!("cache read task failed: {}", e);
                    Ok(HashMap::new())
                })
                .unwrap_or_else(|e| {
                    log::debug!("cache read failed: {}", e);
                    HashMap::new()
                })
        };

        // Invalidate the old session before the map changes so no in-flight
        // fetch from the previous subject can land in the new map.
        let switched = self.state().subject != subject;
        if switched {
            self.invalidate_session();
        }

        let mut changed = false;
        let to_hydrate: Vec<String>;
        let mut to_delete = Vec::new();
        {
            let mut state = self.state();
            if switched {
                state.subject = subject.to_string();
                state.branch_reference = None;
                if !state.entries.is_empty() {
                    state.entries.clear();
                    state.version += 1;
                    changed = true;
                }
            }

            let mut seen: HashSet<&str> = HashSet::with_capacity(summaries.len());
            for summary in &summaries {
                seen.insert(summary.name.as_str());
                let known = state
                    .entries
                    .get(&summary.name)
                    .map(|e| (e.last_modified, e.last_timestamp));
                match known {
                    None => {
                        let insertion = state.next_insertion;
                        state.next_insertion += 1;
                        let entry = adopt_cached(&cached, summary, insertion)
                            .unwrap_or_else(|| metadata_entry(summary, insertion));
                        state.entries.insert(summary.name.clone(), Arc::new(entry));
                        state.version += 1;
                        changed = true;
                    }
                    Some((revision, last_ts)) if revision == summary.revision => {
                        // Unchanged revision: metadata timestamps can still
                        // be fresher than what we parsed earlier.
                        if let Some(ts) = summary.last_turn_timestamp {
                            if last_ts != Some(ts) {
                                let entry = state
                                    .entries
                                    .get_mut(&summary.name)
                                    .expect("entry present");
                                let e = Arc::make_mut(entry);
                                e.last_timestamp = Some(ts);
                                e.sort_timestamp = ts;
                                state.version += 1;
                                changed = true;
                            }
                        }
                    }
                    Some(_) => {
                        // Revision moved: hydrated content is stale.
                        let entry =
                            state.entries.get_mut(&summary.name).expect("entry present");
                        let e = Arc::make_mut(entry);
                        match cached.get(&summary.name) {
                            Some(c) if c.last_modified == summary.revision && c.hydrated => {
                                let insertion = e.insertion_order;
                                let tags = std::mem::take(&mut e.tags);
                                *e = c.clone();
                                e.insertion_order = insertion;
                                e.tags = tags;
                                e.diverges_at = None;
                            }
                            _ => {
                                e.invalidate_content();
                                e.last_modified = summary.revision;
                                if let Some(count) = summary.approx_count {
                                    e.message_count = count;
                                }
                                if let Some(ts) = summary.last_turn_timestamp {
                                    e.last_timestamp = Some(ts);
                                    e.sort_timestamp = ts;
                                }
                            }
                        }
                        state.version += 1;
                        changed = true;
                    }
                }
            }

            let stale: Vec<String> = state
                .entries
                .keys()
                .filter(|name| !seen.contains(name.as_str()))
                .cloned()
                .collect();
            for name in stale {
                state.entries.remove(&name);
                state.version += 1;
                changed = true;
                to_delete.push(name);
            }

            // Everything still lacking content is a hydration candidate;
            // this also re-enqueues entries whose earlier fetch failed.
            // Queued most-recent first so visible logs fill in early.
            let mut candidates: Vec<&Arc<LogEntry>> =
                state.entries.values().filter(|e| !e.hydrated).collect();
            candidates.sort_by(|a, b| canonical_cmp(a, b));
            to_hydrate = candidates.into_iter().map(|e| e.name.clone()).collect();
        }

        // Cache deletions are fire-and-forget.
        for name in to_delete {
            let cache = Arc::clone(&self.cache);
            let subject = subject.to_string();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = cache.delete(&subject, &name) {
                    log::debug!("cache delete of {} failed: {}", name, e);
                }
            });
        }

        self.enqueue_all(to_hydrate);
        self.publish_progress();
        Ok(changed)
    }

    /// Lightweight single-log update for callers that already hold the
    /// freshest content (e.g. the log being actively written to). Recomputes
    /// timestamps and the revision from the content itself; the revision is
    /// guaranteed to differ from the previous one so a stale in-flight fetch
    /// gets discarded by its optimistic check.
    pub fn update_single_entry(&self, name: &str, raw: &[RawTurn]) -> bool {
        let turns = parse_turns(name, raw);
        let mut state = self.state();
        let Some(entry) = state.entries.get_mut(name) else {
            return false;
        };
        let e = Arc::make_mut(entry);
        let previous = e.last_modified;
        e.apply_content(turns);
        e.last_modified = LogEntry::revision_from_content(&e.messages)
            .filter(|r| *r != previous)
            .unwrap_or_else(|| previous.wrapping_add(1));
        state.version += 1;
        true
    }

    /// Attach annotation labels to an entry. This is the only write surface
    /// of the (out-of-scope) annotation subsystem.
    pub fn set_tags(&self, name: &str, tags: Vec<String>) -> bool {
        let mut state = self.state();
        let Some(entry) = state.entries.get_mut(name) else {
            return false;
        };
        if entry.tags == tags {
            return true;
        }
        Arc::make_mut(entry).tags = tags;
        state.version += 1;
        true
    }

    /// Resolve which index entry a live session corresponds to.
    ///
    /// An explicit name wins when it matches a known entry. Otherwise falls
    /// back to comparing first/last normalized message text against hydrated
    /// entries, newest first - a degraded heuristic that can confuse two
    /// structurally identical logs, so hosts should pass the name whenever
    /// they have one.
    pub fn resolve_active(
        &self,
        explicit: Option<&str>,
        first_text: Option<&str>,
        last_text: Option<&str>,
    ) -> Option<String> {
        let state = self.state();
        if let Some(name) = explicit {
            if state.entries.contains_key(name) {
                return Some(name.to_string());
            }
        }
        if first_text.is_none() && last_text.is_none() {
            return None;
        }
        let first_norm = first_text.map(normalize_text);
        let last_norm = last_text.map(normalize_text);

        let mut hydrated: Vec<&Arc<LogEntry>> =
            state.entries.values().filter(|e| e.hydrated && !e.messages.is_empty()).collect();
        hydrated.sort_by(|a, b| canonical_cmp(a, b));

        hydrated
            .into_iter()
            .find(|entry| {
                let first_ok = first_norm.as_deref().is_none_or(|want| {
                    entry.messages.first().is_some_and(|m| normalize_text(&m.text) == want)
                });
                let last_ok = last_norm.as_deref().is_none_or(|want| {
                    entry.messages.last().is_some_and(|m| normalize_text(&m.text) == want)
                });
                first_ok && last_ok
            })
            .map(|entry| entry.name.clone())
    }

    /// Snapshot of every entry in canonical order. Entries are `Arc`'d;
    /// cloning the snapshot is cheap and the contents are immutable.
    pub fn sorted_snapshot(&self) -> Vec<Arc<LogEntry>> {
        let state = self.state();
        let mut entries: Vec<Arc<LogEntry>> = state.entries.values().cloned().collect();
        drop(state);
        entries.sort_by(|a, b| canonical_cmp(a, b));
        entries
    }

    /// Filtered, ordered snapshot for presentation. Pure read; cheap enough
    /// to recompute per call, so nothing here is cached.
    pub fn filtered_snapshot(&self, filter: &EntryFilter, sort: SortField) -> Vec<Arc<LogEntry>> {
        let snapshot = self.sorted_snapshot();
        let mut filtered = apply_filter(snapshot, filter);
        sort_entries(&mut filtered, sort);
        filtered
    }

    pub fn get(&self, name: &str) -> Option<Arc<LogEntry>> {
        self.state().entries.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.state().version
    }

    pub fn subject(&self) -> String {
        self.state().subject.clone()
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state();
        IndexStats {
            entries: state.entries.len(),
            hydrated: state.entries.values().filter(|e| e.hydrated).count(),
            messages: state.entries.values().map(|e| e.messages.len()).sum(),
        }
    }

    /// End the current lifecycle: abandon in-flight hydration, drop every
    /// entry and forget the subject. The instance is immediately reusable.
    pub fn reset(&self) {
        self.invalidate_session();
        let mut state = self.state();
        state.subject.clear();
        state.branch_reference = None;
        if !state.entries.is_empty() {
            state.entries.clear();
            state.version += 1;
        }
    }

    /// Bump the hydration session and clear the queue. Any worker or
    /// in-flight fetch holding the old session id becomes inert.
    pub(crate) fn invalidate_session(&self) {
        let mut sched = self.sched();
        sched.session += 1;
        sched.queue.clear();
        sched.queued.clear();
        sched.in_flight.clear();
        sched.worker_running = false;
    }
}

/// Metadata-only entry from a backend summary; eligible for hydration.
fn metadata_entry(summary: &LogSummary, insertion_order: u64) -> LogEntry {
    LogEntry {
        name: summary.name.clone(),
        last_modified: summary.revision,
        message_count: summary.approx_count.unwrap_or(0),
        messages: Vec::new(),
        first_timestamp: None,
        last_timestamp: summary.last_turn_timestamp,
        sort_timestamp: summary.last_turn_timestamp.unwrap_or_else(LogEntry::epoch),
        insertion_order,
        diverges_at: None,
        hydrated: false,
        tags: Vec::new(),
    }
}

/// Adopt a cached hydrated entry when its revision matches the backend's.
/// The insertion order is local runtime state and is always reassigned.
fn adopt_cached(
    cached: &HashMap<String, LogEntry>,
    summary: &LogSummary,
    insertion_order: u64,
) -> Option<LogEntry> {
    let hit = cached.get(&summary.name)?;
    if hit.last_modified != summary.revision || !hit.hydrated {
        return None;
    }
    let mut entry = hit.clone();
    entry.insertion_order = insertion_order;
    entry.diverges_at = None;
    Some(entry)
}
