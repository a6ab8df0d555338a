//! GhostSpeak Governance
//!
//! - Multisig wallets with M-of-N transaction approval
//! - Proposals with a fixed voting window and weighted for/against/abstain tallies
//! - A role registry mapping ordered roles to fixed permission sets
//!
//! # Invariants
//!
//! 1. At most one vote per (proposal, voter)
//! 2. Approval rate excludes abstentions and is undefined with no decisive votes
//! 3. A role assignment past its expiry is inactive whatever its stored flag says
//! 4. Nobody revokes their own role

pub mod engine;
pub mod multisig;
pub mod proposal;
pub mod rbac;

pub use engine::*;
pub use multisig::*;
pub use proposal::*;
pub use rbac::*;
