//! Staking position, lock periods and tier tables
//!
//! # Tiers
//!
//! | Tier   | Principal (tokens) | Reputation boost | Verified badge | Premium |
//! |--------|--------------------|------------------|----------------|---------|
//! | Bronze | 1,000 - 9,999      | +5%              | no             | no      |
//! | Silver | 10,000 - 99,999    | +15%             | yes            | no      |
//! | Gold   | >= 100,000         | +15%             | yes            | yes     |
//!
//! # Lock periods
//!
//! | Period   | Days | APY bonus |
//! |----------|------|-----------|
//! | None     | 0    | +0        |
//! | Days30   | 30   | +1        |
//! | Days90   | 90   | +2.5      |
//! | Days180  | 180  | +5        |
//! | Days365  | 365  | +10       |

use chrono::{DateTime, Duration, Utc};
use ghostspeak_types::{format_amount, Address, PositionId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

const SECONDS_PER_DAY: i64 = 86_400;

/// Lock period chosen at stake time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPeriod {
    #[default]
    None,
    Days30,
    Days90,
    Days180,
    Days365,
}

impl LockPeriod {
    pub fn days(&self) -> i64 {
        match self {
            LockPeriod::None => 0,
            LockPeriod::Days30 => 30,
            LockPeriod::Days90 => 90,
            LockPeriod::Days180 => 180,
            LockPeriod::Days365 => 365,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.days() * SECONDS_PER_DAY)
    }

    /// Percentage points added to the base APY
    pub fn apy_bonus(&self) -> Decimal {
        match self {
            LockPeriod::None => Decimal::ZERO,
            LockPeriod::Days30 => dec!(1),
            LockPeriod::Days90 => dec!(2.5),
            LockPeriod::Days180 => dec!(5),
            LockPeriod::Days365 => dec!(10),
        }
    }

    pub fn is_locked(&self) -> bool {
        !matches!(self, LockPeriod::None)
    }
}

/// Staking tier, a pure function of principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingTier {
    Bronze,
    Silver,
    Gold,
}

impl StakingTier {
    /// Minimum principal in whole tokens
    pub fn threshold_tokens(&self) -> u64 {
        match self {
            StakingTier::Bronze => 1_000,
            StakingTier::Silver => 10_000,
            StakingTier::Gold => 100_000,
        }
    }

    pub fn benefits(&self) -> TierBenefits {
        match self {
            StakingTier::Bronze => TierBenefits {
                reputation_boost_percent: 5,
                verified_badge: false,
                premium_benefits: false,
            },
            StakingTier::Silver => TierBenefits {
                reputation_boost_percent: 15,
                verified_badge: true,
                premium_benefits: false,
            },
            StakingTier::Gold => TierBenefits {
                reputation_boost_percent: 15,
                verified_badge: true,
                premium_benefits: true,
            },
        }
    }
}

impl fmt::Display for StakingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakingTier::Bronze => write!(f, "bronze"),
            StakingTier::Silver => write!(f, "silver"),
            StakingTier::Gold => write!(f, "gold"),
        }
    }
}

/// Benefits unlocked by a staking tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBenefits {
    pub reputation_boost_percent: u8,
    pub verified_badge: bool,
    pub premium_benefits: bool,
}

/// Position lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Active,
    Locked,
    Unstaked,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Unstaked)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Active => write!(f, "active"),
            PositionStatus::Locked => write!(f, "locked"),
            PositionStatus::Unstaked => write!(f, "unstaked"),
        }
    }
}

/// A staker's position
///
/// Reward fields are in base units and always satisfy
/// `claimed_rewards + unclaimed_rewards == total_rewards`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPosition {
    pub id: PositionId,
    pub staker: Address,
    /// Principal in base units
    pub amount: u64,
    /// Decimals of the staking token
    pub decimals: u8,
    pub staked_at: DateTime<Utc>,
    pub lock_period: LockPeriod,
    /// Equal to `staked_at` when there is no lock
    pub unlock_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub tier: StakingTier,
    pub benefits: TierBenefits,
    pub total_rewards: u64,
    pub claimed_rewards: u64,
    pub unclaimed_rewards: u64,
    pub last_accrual_at: DateTime<Utc>,
    /// Annual yield fixed at stake time, in percent
    pub current_apy: Decimal,
    /// Realised annualised yield so far, in percent
    pub estimated_apy: Decimal,
    pub unstaked_at: Option<DateTime<Utc>>,
}

impl StakingPosition {
    /// Principal as a decimal token amount, e.g. "5000.5"
    pub fn amount_tokens(&self) -> String {
        format_amount(self.amount, self.decimals)
    }

    /// Whether the lock (if any) has elapsed at `now`
    pub fn is_unlocked_at(&self, now: DateTime<Utc>) -> bool {
        !self.lock_period.is_locked() || now >= self.unlock_at
    }

    pub fn rewards_balanced(&self) -> bool {
        self.claimed_rewards.checked_add(self.unclaimed_rewards) == Some(self.total_rewards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_period_bonus() {
        assert_eq!(LockPeriod::None.apy_bonus(), Decimal::ZERO);
        assert_eq!(LockPeriod::Days90.apy_bonus(), dec!(2.5));
        assert_eq!(LockPeriod::Days365.duration(), Duration::days(365));
        assert!(!LockPeriod::None.is_locked());
        assert_eq!(LockPeriod::default(), LockPeriod::None);
    }

    #[test]
    fn test_tier_benefits() {
        let bronze = StakingTier::Bronze.benefits();
        assert_eq!(bronze.reputation_boost_percent, 5);
        assert!(!bronze.verified_badge);

        let silver = StakingTier::Silver.benefits();
        assert!(silver.verified_badge);
        assert!(!silver.premium_benefits);

        let gold = StakingTier::Gold.benefits();
        assert_eq!(gold.reputation_boost_percent, 15);
        assert!(gold.premium_benefits);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&PositionStatus::Unstaked).unwrap();
        assert_eq!(json, "\"unstaked\"");
        let lock = serde_json::to_string(&LockPeriod::Days180).unwrap();
        assert_eq!(lock, "\"days180\"");
    }
}
