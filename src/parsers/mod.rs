//! Parsing of raw backend records into normalized turn sequences.
//!
//! # Error Handling Strategy
//!
//! Parsing follows a **graceful degradation** approach: a turn with no text
//! is logged and skipped rather than failing the whole log, so one malformed
//! record never hides an otherwise readable conversation. Parsing is pure -
//! it holds no state and touches no I/O - which keeps it trivially reusable
//! from the hydration path, the single-entry update path and tests.

pub mod turns;

pub use turns::{RawTurn, normalize_text, parse_turns};
