use std::cmp::Reverse;

use super::{Interval, NodeId, Trie};

/// Assign every node under `root` its proportional vertical interval.
///
/// The layout root spans [0,1]. At each node the children are ordered with
/// the active log's child first, then by descending log count, then by key
/// text so sibling order is stable across rebuilds; each child's span is
/// proportional to its log count relative to the sibling total. The last
/// child is snapped to the parent's end so the children tile the parent
/// exactly despite float rounding. Runs iteratively over the arena.
pub fn assign_intervals(trie: &mut Trie, root: NodeId, active_log: Option<&str>) {
    trie.nodes[root].interval = Interval::UNIT;

    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let parent_interval = trie.nodes[id].interval;
        let mut ordered = trie.nodes[id].children.clone();
        if ordered.is_empty() {
            continue;
        }
        ordered.sort_by_cached_key(|&c| {
            let node = &trie.nodes[c];
            let has_active = active_log
                .is_some_and(|a| node.log_names.iter().any(|n| n == a));
            let text = node.key.as_ref().map(|k| k.text.clone()).unwrap_or_default();
            (!has_active, Reverse(node.log_names.len()), text)
        });

        let total: usize = ordered.iter().map(|&c| trie.nodes[c].log_names.len()).sum();
        let mut cursor = parent_interval.start;
        for (pos, &child) in ordered.iter().enumerate() {
            let weight = trie.nodes[child].log_names.len() as f64 / total as f64;
            let end = if pos == ordered.len() - 1 {
                parent_interval.end
            } else {
                cursor + parent_interval.len() * weight
            };
            trie.nodes[child].interval = Interval { start: cursor, end };
            cursor = end;
            stack.push(child);
        }
    }
}

/// Depth-first pre-order traversal below `root`, children visited in
/// interval order. The layout root itself is excluded.
pub fn flatten(trie: &Trie, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(trie.len().saturating_sub(1));
    let mut stack = Vec::new();
    push_children(trie, root, &mut stack);
    while let Some(id) = stack.pop() {
        out.push(id);
        push_children(trie, id, &mut stack);
    }
    out
}

fn push_children(trie: &Trie, id: NodeId, stack: &mut Vec<NodeId>) {
    let mut children = trie.node(id).children.clone();
    children.sort_by(|&a, &b| {
        trie.node(a)
            .interval
            .start
            .partial_cmp(&trie.node(b).interval.start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    // Reversed so the smallest start pops first.
    for child in children.into_iter().rev() {
        stack.push(child);
    }
}
