use std::collections::HashMap;
use std::sync::Arc;

use super::{Interval, NodeId, ROOT, Trie, TrieNode, TurnKey};
use crate::models::LogEntry;

/// Merge every hydrated log into one prefix tree.
///
/// Walks each log turn by turn, reusing the child with a matching
/// (role, normalized text) key or creating one. Entries that are not
/// hydrated yet, or hydrated to zero turns, contribute nothing. Walk order
/// follows the given snapshot, so arena ids and `log_names` order are
/// deterministic for a canonical snapshot.
pub fn build(entries: &[Arc<LogEntry>]) -> Trie {
    let mut nodes = vec![TrieNode {
        key: None,
        depth: -1,
        log_names: Vec::new(),
        children: Vec::new(),
        representative: None,
        interval: Interval::default(),
    }];
    // Per-node key → child lookup, only needed while building.
    let mut child_index: Vec<HashMap<TurnKey, NodeId>> = vec![HashMap::new()];

    for entry in entries.iter().filter(|e| e.hydrated && !e.messages.is_empty()) {
        nodes[ROOT].log_names.push(entry.name.clone());
        let mut current = ROOT;
        for turn in &entry.messages {
            let key = TurnKey::from_turn(turn);
            let next = match child_index[current].get(&key) {
                Some(&id) => id,
                None => {
                    let id = nodes.len();
                    nodes.push(TrieNode {
                        key: Some(key.clone()),
                        depth: turn.ordinal as i32,
                        log_names: Vec::new(),
                        children: Vec::new(),
                        representative: Some(turn.clone()),
                        interval: Interval::default(),
                    });
                    child_index.push(HashMap::new());
                    child_index[current].insert(key, id);
                    nodes[current].children.push(id);
                    id
                }
            };
            nodes[next].log_names.push(entry.name.clone());
            current = next;
        }
    }

    Trie { nodes }
}
