use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{LogTurn, Role};

/// One turn as the backend delivers it, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTurn {
    #[serde(default)]
    pub role: String,
    /// Absent text marks a malformed record; the turn is skipped.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default, rename = "activeVariantIndex")]
    pub active_variant: Option<usize>,
}

/// Turn raw backend records into the normalized turn sequence for one log.
///
/// Records without a text field are skipped with a warning; ordinals are
/// assigned over the surviving turns so the sequence stays dense. The active
/// variant index is clamped into the variant list's range.
pub fn parse_turns(log_name: &str, raw: &[RawTurn]) -> Vec<LogTurn> {
    let mut turns = Vec::with_capacity(raw.len());

    for (pos, record) in raw.iter().enumerate() {
        let Some(text) = record.text.as_deref() else {
            log::warn!("skipping turn {} of {}: no text field", pos, log_name);
            continue;
        };

        let active_variant = match record.active_variant {
            Some(idx) if !record.variants.is_empty() => idx.min(record.variants.len() - 1),
            _ => 0,
        };

        turns.push(LogTurn {
            log_name: log_name.to_string(),
            ordinal: turns.len(),
            role: Role::from_raw(&record.role),
            text: text.to_string(),
            timestamp: record.timestamp,
            variants: record.variants.clone(),
            active_variant,
        });
    }

    turns
}

/// Canonical comparison form of turn text: trimmed, inner whitespace runs
/// collapsed to single spaces. Branch detection and trie keys both use this,
/// so the two views of divergence always agree.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_gap = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            in_gap = true;
        } else {
            if in_gap && !out.is_empty() {
                out.push(' ');
            }
            in_gap = false;
            out.push(ch);
        }
    }
    out
}
