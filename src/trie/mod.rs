//! The merged prefix tree over all hydrated logs, plus its proportional
//! layout.
//!
//! Logs sharing a turn-for-turn prefix share a single path through the tree
//! and split into distinct children at their first differing turn - the same
//! divergence notion the branch detector computes pairwise, expressed as a
//! tree. Nodes live in a flat arena addressed by integer ids; child order is
//! decided at traversal time from the layout intervals, never from insertion
//! order.

pub mod builder;
pub mod layout;

use serde::{Deserialize, Serialize};

use crate::models::{LogTurn, Role};
use crate::parsers::normalize_text;

pub type NodeId = usize;

/// Arena index of the virtual root.
pub const ROOT: NodeId = 0;

/// Composite key a turn contributes to the tree: speaker plus normalized
/// text. Two turns with the same key occupy the same node at a given depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnKey {
    pub role: Role,
    pub text: String,
}

impl TurnKey {
    pub fn from_turn(turn: &LogTurn) -> Self {
        Self { role: turn.role, text: normalize_text(&turn.text) }
    }
}

/// Half-open vertical span in [0,1) assigned by layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub const UNIT: Interval = Interval { start: 0.0, end: 1.0 };

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrieNode {
    /// `None` only for the virtual root.
    pub key: Option<TurnKey>,
    /// Turn ordinal this node sits at; −1 for the virtual root.
    pub depth: i32,
    /// Every log whose path passes through this node.
    pub log_names: Vec<String>,
    pub children: Vec<NodeId>,
    /// One concrete turn shown for this node (the first one merged into it).
    pub representative: Option<LogTurn>,
    pub interval: Interval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trie {
    pub(crate) nodes: Vec<TrieNode>,
}

impl Trie {
    pub fn node(&self, id: NodeId) -> &TrieNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The virtual root always exists; "empty" means no real nodes.
        self.nodes.len() <= 1
    }

    /// Deepest node on `log`'s path whose depth does not exceed `depth`.
    /// Returns the virtual root when the log is absent from the tree.
    pub fn descend_path(&self, log: &str, depth: usize) -> NodeId {
        let mut current = ROOT;
        while self.nodes[current].depth < depth as i32 {
            let next = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].log_names.iter().any(|n| n == log));
            match next {
                Some(child) => current = child,
                None => break,
            }
        }
        current
    }
}

/// Zoom target: re-root the layout at the node `depth` turns down `log`'s
/// path, exploring that subtree as if it were the whole tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadFocus {
    pub log: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrieOptions {
    /// Log whose path sorts first at every split.
    pub active_log: Option<String>,
    pub focus: Option<ThreadFocus>,
}

/// A built and laid-out tree, ready for a layout-agnostic renderer.
#[derive(Debug, Clone)]
pub struct TrieBuild {
    pub trie: Trie,
    /// Layout root: the virtual root, or the focused node.
    pub root: NodeId,
    /// Pre-order, interval-ordered traversal below the layout root. The
    /// layout root itself is excluded.
    pub flattened: Vec<NodeId>,
    /// Deepest turn ordinal present under the layout root.
    pub max_depth: i32,
    /// Subtract from a node's depth to get its row relative to the layout
    /// root's children (0 for the first visible row).
    pub depth_offset: i32,
}

impl crate::index::store::ChatIndex {
    /// Build the prefix tree over the current hydrated snapshot, lay it out
    /// and flatten it. A focus that names an absent log or an unreachable
    /// depth clamps to the deepest node actually on the path.
    pub fn build_trie(&self, options: &TrieOptions) -> TrieBuild {
        let snapshot = self.sorted_snapshot();
        let mut trie = builder::build(&snapshot);
        let root = match &options.focus {
            Some(focus) => trie.descend_path(&focus.log, focus.depth),
            None => ROOT,
        };
        layout::assign_intervals(&mut trie, root, options.active_log.as_deref());
        let flattened = layout::flatten(&trie, root);
        let max_depth =
            flattened.iter().map(|&id| trie.node(id).depth).max().unwrap_or(trie.node(root).depth);
        let depth_offset = trie.node(root).depth + 1;
        TrieBuild { trie, root, flattened, max_depth, depth_offset }
    }
}
