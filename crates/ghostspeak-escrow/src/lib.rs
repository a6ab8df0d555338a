//! GhostSpeak Escrow - two-party payment holding with dispute resolution
//!
//! Funds are held between a client and an agent until the client releases
//! them, the client cancels, or a mediator resolves a dispute.
//!
//! # Invariants
//!
//! 1. Status only moves forward through its lattice
//! 2. At most one dispute per escrow
//! 3. A resolved dispute pays out exactly the held amount

pub mod escrow;
pub mod engine;

pub use escrow::*;
pub use engine::*;
