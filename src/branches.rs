//! Branch detection: where does one log diverge from another?
//!
//! Two logs are related when they share their opening turn; the divergence
//! point is the first turn index at which their normalized text differs.
//! Comparison uses the same (role, normalized text) key as the prefix tree,
//! so a pairwise divergence point always equals the depth at which the two
//! logs split into distinct trie children.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::index::store::ChatIndex;
use crate::models::{LogEntry, LogTurn};
use crate::parsers::normalize_text;

/// Minimum turns either side needs before a divergence fact is meaningful.
const MIN_RELATED_TURNS: usize = 2;

/// One sibling branch of a base log: everything it says after the shared
/// prefix ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SiblingBranch {
    pub name: String,
    /// Turn index at which the sibling leaves the shared prefix.
    pub diverges_at: usize,
    /// The sibling's turns after the divergence point. Empty when the
    /// sibling is a strict prefix of the base.
    pub turns: Vec<LogTurn>,
    pub last_activity: DateTime<Utc>,
}

fn turns_match(a: &LogTurn, b: &LogTurn) -> bool {
    a.role == b.role && normalize_text(&a.text) == normalize_text(&b.text)
}

/// First turn index where `candidate` departs from `reference`.
///
/// `None` when the two are unrelated: either side has fewer than two turns,
/// or their opening turns already differ. When one sequence is a strict
/// prefix of the other, the divergence point is the shared length itself.
pub fn divergence_point(reference: &[LogTurn], candidate: &[LogTurn]) -> Option<usize> {
    if reference.len() < MIN_RELATED_TURNS || candidate.len() < MIN_RELATED_TURNS {
        return None;
    }
    if !turns_match(&reference[0], &candidate[0]) {
        return None;
    }
    let shared = reference.len().min(candidate.len());
    for i in 1..shared {
        if !turns_match(&reference[i], &candidate[i]) {
            return Some(i);
        }
    }
    Some(shared)
}

fn sibling_from(entry: &LogEntry, diverges_at: usize) -> SiblingBranch {
    SiblingBranch {
        name: entry.name.clone(),
        diverges_at,
        turns: entry.messages.get(diverges_at..).unwrap_or_default().to_vec(),
        last_activity: entry.sort_timestamp,
    }
}

fn sort_and_truncate(mut siblings: Vec<SiblingBranch>, limit: usize) -> Vec<SiblingBranch> {
    siblings.sort_by(|a, b| {
        b.last_activity.cmp(&a.last_activity).then_with(|| a.name.cmp(&b.name))
    });
    siblings.truncate(limit);
    siblings
}

impl ChatIndex {
    /// Recompute the divergence fact of every entry relative to `reference`.
    ///
    /// Clears all stored facts first; facts are only written when the
    /// reference is hydrated with at least two turns, and only onto other
    /// hydrated entries with at least two turns. The pairwise scans are
    /// independent, so the sweep runs across a rayon pool and the results
    /// are applied under the store writer afterwards. Intentionally run off
    /// the interactive path: it touches every hydrated entry.
    pub fn detect_branches(&self, reference: &str) {
        let (reference_entry, candidates) = {
            let state = self.state();
            (
                state.entries.get(reference).cloned(),
                state.entries.values().cloned().collect::<Vec<Arc<LogEntry>>>(),
            )
        };

        let facts: HashMap<String, usize> = match reference_entry {
            Some(r) if r.hydrated && r.messages.len() >= MIN_RELATED_TURNS => candidates
                .par_iter()
                .filter(|c| c.name != reference && c.hydrated)
                .filter_map(|c| {
                    divergence_point(&r.messages, &c.messages).map(|d| (c.name.clone(), d))
                })
                .collect(),
            _ => HashMap::new(),
        };

        let mut state = self.state();
        let mut changed = state.branch_reference.as_deref() != Some(reference);
        state.branch_reference = Some(reference.to_string());
        for (name, entry) in state.entries.iter_mut() {
            let target = facts.get(name).copied();
            if entry.diverges_at != target {
                Arc::make_mut(entry).diverges_at = target;
                changed = true;
            }
        }
        if changed {
            state.version += 1;
        }
    }

    /// Sibling branches of `name`, most recently active first, truncated to
    /// `limit`. Uses the facts stored by [`detect_branches`] when `name` is
    /// the detected reference; for any other base this transparently falls
    /// back to the on-demand computation, since stored facts describe a
    /// different reference.
    pub fn siblings_of(&self, name: &str, limit: usize) -> Vec<SiblingBranch> {
        let stored = {
            let state = self.state();
            if state.branch_reference.as_deref() != Some(name) {
                None
            } else {
                Some(
                    state
                        .entries
                        .values()
                        .filter(|e| e.name != name)
                        .filter_map(|e| e.diverges_at.map(|d| sibling_from(e, d)))
                        .collect::<Vec<_>>(),
                )
            }
        };
        match stored {
            Some(siblings) => sort_and_truncate(siblings, limit),
            None => self.siblings_of_arbitrary(name, limit),
        }
    }

    /// Compute siblings against an arbitrary base without touching any
    /// stored divergence facts. Read-only; safe to call at any time.
    pub fn siblings_of_arbitrary(&self, base: &str, limit: usize) -> Vec<SiblingBranch> {
        let state = self.state();
        let Some(base_entry) = state.entries.get(base) else {
            return Vec::new();
        };
        if !base_entry.hydrated || base_entry.messages.len() < MIN_RELATED_TURNS {
            return Vec::new();
        }
        let siblings = state
            .entries
            .values()
            .filter(|e| e.name != base && e.hydrated)
            .filter_map(|e| {
                divergence_point(&base_entry.messages, &e.messages)
                    .map(|d| sibling_from(e, d))
            })
            .collect();
        drop(state);
        sort_and_truncate(siblings, limit)
    }
}
