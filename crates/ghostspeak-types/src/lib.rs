//! GhostSpeak Types - Canonical domain types for the agent-commerce rules layer
//!
//! This crate contains the foundational types shared by every GhostSpeak
//! engine, with zero dependencies on other ghostspeak crates:
//!
//! - Identity types (ledger `Address`, typed record ids)
//! - Token metadata and the exact base-unit amount codec
//! - The error taxonomy every engine reports through
//! - Protocol configuration and the per-call context
//!
//! # Invariants
//!
//! 1. Money is always an integer count of base units
//! 2. Engines never read the wall clock; "now" arrives in a [`CallContext`]
//! 3. Statuses, tiers and roles are closed enums, serialized as snake_case strings

pub mod identity;
pub mod token;
pub mod config;
pub mod error;

pub use identity::*;
pub use token::*;
pub use config::*;
pub use error::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the GhostSpeak record schema
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Explicit per-call context threaded into every engine operation
///
/// Carries the acting identity and the instant the orchestration layer read
/// from its clock, so engine results are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Identity performing the operation
    pub caller: Address,
    /// Instant the operation is evaluated at
    pub now: DateTime<Utc>,
}

impl CallContext {
    /// Create a context for `caller` at `now`
    pub fn new(caller: Address, now: DateTime<Utc>) -> Self {
        Self { caller, now }
    }

    /// Same caller, later instant
    pub fn at(&self, now: DateTime<Utc>) -> Self {
        Self {
            caller: self.caller.clone(),
            now,
        }
    }
}
