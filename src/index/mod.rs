//! The authoritative in-memory index of one subject's logs.
//!
//! # Error Handling Strategy
//!
//! The store combines graceful degradation with a single hard failure mode:
//!
//! - **Backend list failures**: propagate out of [`ChatIndex::refresh`] and
//!   leave the index untouched - there is no partial reconciliation.
//! - **Cache failures**: swallowed everywhere and treated as misses; a
//!   broken cache is never observable through the store's API.
//! - **Per-log content failures**: logged and left for a later retry; the
//!   entry stays in the index in metadata-only form.
//!
//! Everything a consumer reads comes from snapshots of `Arc`'d entries, so
//! readers never observe a half-applied mutation.

pub mod ordering;
pub mod store;

pub use ordering::canonical_cmp;
pub use store::ChatIndex;
