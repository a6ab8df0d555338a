//! GhostSpeak Reputation - Ghost Score engine
//!
//! Derives a bounded 0-1000 score, an ordered tier and a set of qualitative
//! tags from an agent's job history.
//!
//! # Invariants
//!
//! 1. `score`, `tier` and `tags` are a pure function of the other record fields
//! 2. Every transition returns a new record; the input is never mutated

pub mod record;
pub mod engine;

pub use record::*;
pub use engine::*;
