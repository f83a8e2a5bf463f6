//! Background hydration: filling metadata-only entries with full content.
//!
//! The scheduler is a FIFO queue drained by a single worker task. Each loop
//! iteration pops a bounded batch and fetches its logs concurrently; each
//! completed fetch is written back under an optimistic revision check, so a
//! slow fetch can never clobber content that changed while it was in flight.
//! Cancellation is coarse: every piece of pending work carries the session
//! id it was started under, and a bumped session (subject switch, reset)
//! makes all of it inert without per-request tokens.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::index::store::ChatIndex;
use crate::models::HydrationProgress;
use crate::parsers::{RawTurn, parse_turns};

impl ChatIndex {
    /// Queue one log for background hydration. No-op if the log is already
    /// hydrated, already queued or currently being fetched.
    pub fn enqueue(&self, name: &str) {
        self.enqueue_all(vec![name.to_string()]);
    }

    /// Move an already-queued log to the front of the queue, for when the
    /// host needs one specific log next (e.g. the log currently open).
    pub fn prioritize(&self, name: &str) {
        let mut sched = self.sched();
        if let Some(pos) = sched.queue.iter().position(|n| n == name) {
            sched.queue.remove(pos);
            sched.queue.push_front(name.to_string());
        }
    }

    /// Hydrate one log immediately, bypassing the queue. Coalesces with any
    /// concurrent fetch of the same name and applies the same optimistic
    /// revision check as the background path. Returns whether the entry is
    /// hydrated afterwards.
    pub async fn hydrate_now(&self, name: &str) -> bool {
        let (subject, expected, session) = {
            let state = self.state();
            let Some(entry) = state.entries.get(name) else {
                return false;
            };
            if entry.hydrated {
                return true;
            }
            let mut sched = self.sched();
            if sched.in_flight.contains(name) {
                // Someone is already fetching this log; don't duplicate the
                // request, just report the current (un-hydrated) state.
                return false;
            }
            if let Some(pos) = sched.queue.iter().position(|n| n == name) {
                sched.queue.remove(pos);
                sched.queued.remove(name);
            }
            sched.in_flight.insert(name.to_string());
            (state.subject.clone(), entry.last_modified, sched.session)
        };

        let result = self.backend.fetch_log(&subject, name).await;
        self.finish_fetch(session, name.to_string(), expected, result);
        self.ensure_worker();
        self.publish_progress_for(session);

        self.get(name).is_some_and(|e| e.hydrated)
    }

    /// True once the queue and the in-flight set are both empty. Entries
    /// whose fetch failed stay un-hydrated but do not block completion; they
    /// are retried on the next refresh.
    pub fn is_hydration_complete(&self) -> bool {
        let sched = self.sched();
        sched.queue.is_empty() && sched.in_flight.is_empty()
    }

    pub fn hydration_progress(&self) -> HydrationProgress {
        let state = self.state();
        HydrationProgress {
            loaded: state.entries.values().filter(|e| e.hydrated).count(),
            total: state.entries.len(),
        }
    }

    /// Subscribe to progress updates. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<HydrationProgress> {
        self.progress_tx.subscribe()
    }

    pub(crate) fn enqueue_all(&self, names: Vec<String>) {
        {
            let state = self.state();
            let mut sched = self.sched();
            for name in names {
                let needs_content =
                    state.entries.get(&name).is_some_and(|e| !e.hydrated);
                if !needs_content
                    || sched.queued.contains(&name)
                    || sched.in_flight.contains(&name)
                {
                    continue;
                }
                sched.queued.insert(name.clone());
                sched.queue.push_back(name);
            }
        }
        self.ensure_worker();
    }

    /// Restart the worker if work is pending and no worker is running. The
    /// drain-then-enqueue race resolves here: whoever enqueues after the
    /// worker exited spawns the next one.
    pub(crate) fn ensure_worker(&self) {
        let Some(this) = self.self_ref.upgrade() else {
            return;
        };
        let session = {
            let mut sched = self.sched();
            if sched.queue.is_empty() || sched.worker_running {
                return;
            }
            sched.worker_running = true;
            sched.session
        };
        tokio::spawn(async move {
            this.run_hydration_loop(session).await;
        });
    }

    async fn run_hydration_loop(self: Arc<Self>, session: u64) {
        loop {
            let (subject, batch) = {
                let state = self.state();
                let mut sched = self.sched();
                if sched.session != session {
                    return;
                }
                let mut batch = Vec::with_capacity(self.config.hydration_batch);
                while batch.len() < self.config.hydration_batch {
                    let Some(name) = sched.queue.pop_front() else {
                        break;
                    };
                    sched.queued.remove(&name);
                    // Entries can hydrate or vanish while queued; re-check
                    // and capture the revision the fetch is expected to match.
                    if let Some(entry) = state.entries.get(&name) {
                        if !entry.hydrated {
                            sched.in_flight.insert(name.clone());
                            batch.push((name, entry.last_modified));
                        }
                    }
                }
                if batch.is_empty() {
                    sched.worker_running = false;
                    return;
                }
                (state.subject.clone(), batch)
            };

            let mut fetches = JoinSet::new();
            for (name, expected) in batch {
                let backend = Arc::clone(&self.backend);
                let subject = subject.clone();
                fetches.spawn(async move {
                    let result = backend.fetch_log(&subject, &name).await;
                    (name, expected, result)
                });
            }
            while let Some(joined) = fetches.join_next().await {
                let Ok((name, expected, result)) = joined else {
                    continue;
                };
                self.finish_fetch(session, name, expected, result);
            }

            self.publish_progress_for(session);
        }
    }

    /// Write back one completed fetch. The optimistic check: if the entry's
    /// revision moved while the fetch was in flight, the result is stale -
    /// discard it and requeue the name instead of overwriting newer content.
    pub(crate) fn finish_fetch(
        &self,
        session: u64,
        name: String,
        expected_revision: u64,
        result: Result<Vec<RawTurn>>,
    ) {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("failed to fetch log {}: {}; will retry later", name, e);
                let mut sched = self.sched();
                if sched.session == session {
                    sched.in_flight.remove(&name);
                }
                return;
            }
        };
        let turns = parse_turns(&name, &raw);

        let mut state = self.state();
        let mut sched = self.sched();
        if sched.session != session {
            // Subject switched or reset while fetching; the sets were
            // cleared at the bump, so there is nothing to undo.
            return;
        }
        sched.in_flight.remove(&name);

        let Some(entry) = state.entries.get_mut(&name) else {
            return; // deleted while in flight
        };
        if entry.last_modified != expected_revision {
            if !sched.queued.contains(&name) {
                sched.queued.insert(name.clone());
                sched.queue.push_back(name);
            }
            return;
        }

        Arc::make_mut(entry).apply_content(turns);
        let snapshot = (**entry).clone();
        state.version += 1;
        let subject = state.subject.clone();
        drop(sched);
        drop(state);

        // Write-through to the persistent cache; failures are invisible.
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = cache.write(&subject, &snapshot) {
                log::debug!("cache write of {} failed: {}", snapshot.name, e);
            }
        });
    }

    pub(crate) fn publish_progress(&self) {
        let progress = self.hydration_progress();
        let _ = self.progress_tx.send_replace(progress);
    }

    /// Publish progress only if `session` is still current, so a worker for
    /// an abandoned subject cannot emit events about the new one.
    pub(crate) fn publish_progress_for(&self, session: u64) {
        if self.sched().session != session {
            return;
        }
        self.publish_progress();
    }
}
