//! GhostSpeak Staking - tiered positions with continuous reward accrual
//!
//! # Invariants
//!
//! 1. One live position per staker; `unstaked` is terminal
//! 2. `claimed_rewards + unclaimed_rewards == total_rewards` after every operation
//! 3. Tier is a pure function of principal

pub mod position;
pub mod engine;

pub use position::*;
pub use engine::*;
