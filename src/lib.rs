//! Chat Atlas - incremental index, branch detection and prefix-tree layout
//! for append-only chat logs.
//!
//! This library maintains a local index over the conversation logs of one
//! subject at a time. It supports:
//!
//! - Reconciling the index against a host-supplied backend, adopting cached
//!   entries and hydrating the rest in the background
//! - Detecting where two logs share a common prefix and diverge
//! - Merging all logs into a weighted prefix tree with a proportional
//!   [0,1) interval layout for visualization
//!
//! The host injects the backend and cache collaborators; everything the UI
//! layer reads comes from immutable snapshots keyed by a monotonic version.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_atlas::{ChatIndex, IndexConfig, NullCache, TrieOptions};
//! # use chat_atlas::BackendPort;
//!
//! # async fn run(backend: Arc<dyn BackendPort>) -> anyhow::Result<()> {
//! let index = ChatIndex::new(backend, Arc::new(NullCache), IndexConfig::default());
//! index.refresh("alice").await?;
//!
//! let snapshot = index.sorted_snapshot();
//! let tree = index.build_trie(&TrieOptions::default());
//! println!("{} logs, {} tree nodes", snapshot.len(), tree.flattened.len());
//! # Ok(())
//! # }
//! ```

pub mod branches;
pub mod cache;
pub mod config;
pub mod filters;
pub mod hydration;
pub mod index;
pub mod models;
pub mod parsers;
pub mod ports;
pub mod trie;

// Re-export commonly used types
pub use branches::{SiblingBranch, divergence_point};
pub use cache::DiskCache;
pub use config::IndexConfig;
pub use filters::{EntryFilter, SortField};
pub use index::ChatIndex;
pub use models::{HydrationProgress, IndexStats, LogEntry, LogTurn, Role};
pub use parsers::{RawTurn, normalize_text, parse_turns};
pub use ports::{BackendPort, CachePort, LogSummary, NullCache};
pub use trie::{NodeId, ThreadFocus, Trie, TrieBuild, TrieNode, TrieOptions, TurnKey};
