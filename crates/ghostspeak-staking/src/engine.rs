//! Staking engine
//!
//! Rewards accrue linearly:
//!
//! ```text
//! reward = principal * (current_apy / 100) * (elapsed_seconds / 31_536_000)
//! ```
//!
//! truncated to whole base units at each accrual.

use chrono::{DateTime, Utc};
use ghostspeak_types::{
    tokens_to_units, CallContext, GhostSpeakError, PositionId, Result, StakingConfig,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::position::{LockPeriod, PositionStatus, StakingPosition, StakingTier, TierBenefits};

const SECONDS_PER_YEAR: i64 = 31_536_000;

/// Request to open a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRequest {
    /// Principal in base units
    pub amount: u64,
    #[serde(default)]
    pub lock_period: LockPeriod,
}

/// Payout produced by unstaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeSettlement {
    pub principal: u64,
    pub rewards: u64,
    pub total: u64,
}

/// Staking engine
#[derive(Debug, Clone, Default)]
pub struct StakingEngine {
    config: StakingConfig,
}

impl StakingEngine {
    pub fn new(config: StakingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Minimum stake in base units
    pub fn min_stake_units(&self) -> Result<u64> {
        tokens_to_units(self.config.min_stake_tokens, self.config.token_decimals)
    }

    /// Tier for a principal in base units, `None` below bronze
    pub fn determine_tier(&self, amount: u64) -> Option<StakingTier> {
        [StakingTier::Gold, StakingTier::Silver, StakingTier::Bronze]
            .into_iter()
            .find(|tier| {
                tokens_to_units(tier.threshold_tokens(), self.config.token_decimals)
                    .map(|threshold| amount >= threshold)
                    .unwrap_or(false)
            })
    }

    pub fn tier_benefits(&self, tier: StakingTier) -> TierBenefits {
        tier.benefits()
    }

    /// APY for a lock period, in percent
    pub fn apy_for(&self, lock_period: LockPeriod) -> Decimal {
        self.config.base_apy + lock_period.apy_bonus()
    }

    /// Open a position for `ctx.caller`
    ///
    /// `existing` is the staker's current position, if any.
    pub fn stake(
        &self,
        existing: Option<&StakingPosition>,
        request: &StakeRequest,
        ctx: &CallContext,
    ) -> Result<StakingPosition> {
        let minimum = self.min_stake_units()?;
        if request.amount < minimum {
            debug!(staker = %ctx.caller, amount = request.amount, minimum, "stake below minimum");
            return Err(GhostSpeakError::StakeBelowMinimum {
                minimum,
                provided: request.amount,
            });
        }

        if let Some(position) = existing {
            if !position.status.is_terminal() {
                return Err(GhostSpeakError::AlreadyStaked {
                    staker: ctx.caller.to_string(),
                });
            }
        }

        let tier = match self.determine_tier(request.amount) {
            Some(tier) => tier,
            None => {
                return Err(GhostSpeakError::StakeBelowMinimum {
                    minimum: tokens_to_units(
                        StakingTier::Bronze.threshold_tokens(),
                        self.config.token_decimals,
                    )?,
                    provided: request.amount,
                })
            }
        };

        let status = if request.lock_period.is_locked() {
            PositionStatus::Locked
        } else {
            PositionStatus::Active
        };

        let position = StakingPosition {
            id: PositionId::new(),
            staker: ctx.caller.clone(),
            amount: request.amount,
            decimals: self.config.token_decimals,
            staked_at: ctx.now,
            lock_period: request.lock_period,
            unlock_at: ctx.now + request.lock_period.duration(),
            status,
            tier,
            benefits: tier.benefits(),
            total_rewards: 0,
            claimed_rewards: 0,
            unclaimed_rewards: 0,
            last_accrual_at: ctx.now,
            current_apy: self.apy_for(request.lock_period),
            estimated_apy: Decimal::ZERO,
            unstaked_at: None,
        };

        info!(
            position_id = %position.id,
            staker = %position.staker,
            amount = position.amount,
            tier = %position.tier,
            status = %position.status,
            apy = %position.current_apy,
            "stake opened"
        );
        Ok(position)
    }

    /// Rewards that would accrue between the last accrual and `at`
    pub fn preview_rewards(&self, position: &StakingPosition, at: DateTime<Utc>) -> Result<u64> {
        if position.status.is_terminal() {
            return Ok(0);
        }
        let elapsed = (at - position.last_accrual_at).num_seconds();
        reward_for(position.amount, position.current_apy, elapsed)
    }

    /// Bring rewards up to `now`
    ///
    /// Calling twice with the same `now` adds nothing the second time.
    pub fn accrue_rewards(
        &self,
        position: &StakingPosition,
        now: DateTime<Utc>,
    ) -> Result<StakingPosition> {
        let mut next = position.clone();
        if next.status.is_terminal() {
            return Ok(next);
        }

        let reward = self.preview_rewards(position, now)?;
        next.unclaimed_rewards = next
            .unclaimed_rewards
            .checked_add(reward)
            .ok_or(GhostSpeakError::AmountOverflow)?;
        next.total_rewards = next
            .total_rewards
            .checked_add(reward)
            .ok_or(GhostSpeakError::AmountOverflow)?;
        if now > next.last_accrual_at {
            next.last_accrual_at = now;
        }
        if next.status == PositionStatus::Locked && now >= next.unlock_at {
            next.status = PositionStatus::Active;
            info!(position_id = %next.id, "lock period elapsed");
        }
        next.estimated_apy = estimated_apy(&next);

        debug!(position_id = %next.id, reward, total = next.total_rewards, "rewards accrued");
        Ok(next)
    }

    /// Whether the position may be unstaked at `now`
    pub fn can_unstake(&self, position: &StakingPosition, now: DateTime<Utc>) -> bool {
        !position.status.is_terminal() && position.is_unlocked_at(now)
    }

    /// Close the position, paying out principal and every unclaimed reward
    pub fn unstake(
        &self,
        position: &StakingPosition,
        ctx: &CallContext,
    ) -> Result<(StakingPosition, UnstakeSettlement)> {
        ensure_owner(position, ctx)?;
        if position.status.is_terminal() {
            return Err(GhostSpeakError::AlreadyUnstaked {
                position_id: position.id.to_string(),
            });
        }
        if !position.is_unlocked_at(ctx.now) {
            warn!(position_id = %position.id, unlocks_at = %position.unlock_at, "unstake before unlock");
            return Err(GhostSpeakError::LockPeriodActive {
                unlocks_at: position.unlock_at.to_rfc3339(),
            });
        }

        let mut next = self.accrue_rewards(position, ctx.now)?;
        let rewards = next.unclaimed_rewards;
        let total = next
            .amount
            .checked_add(rewards)
            .ok_or(GhostSpeakError::AmountOverflow)?;

        next.claimed_rewards += rewards;
        next.unclaimed_rewards = 0;
        next.status = PositionStatus::Unstaked;
        next.unstaked_at = Some(ctx.now);

        info!(
            position_id = %next.id,
            staker = %next.staker,
            principal = next.amount,
            rewards,
            "position unstaked"
        );
        Ok((
            next.clone(),
            UnstakeSettlement {
                principal: next.amount,
                rewards,
                total,
            },
        ))
    }

    /// Accrue, then move every unclaimed reward to claimed
    pub fn claim_rewards(
        &self,
        position: &StakingPosition,
        ctx: &CallContext,
    ) -> Result<(StakingPosition, u64)> {
        ensure_owner(position, ctx)?;
        if position.status.is_terminal() {
            return Err(GhostSpeakError::AlreadyUnstaked {
                position_id: position.id.to_string(),
            });
        }

        let mut next = self.accrue_rewards(position, ctx.now)?;
        let claimed = next.unclaimed_rewards;
        if claimed == 0 {
            return Err(GhostSpeakError::NoRewardsToClaim);
        }
        next.claimed_rewards += claimed;
        next.unclaimed_rewards = 0;

        info!(position_id = %next.id, claimed, "rewards claimed");
        Ok((next, claimed))
    }
}

fn ensure_owner(position: &StakingPosition, ctx: &CallContext) -> Result<()> {
    if position.staker != ctx.caller {
        return Err(GhostSpeakError::unauthorized(format!(
            "{} does not own staking position {}",
            ctx.caller, position.id
        )));
    }
    Ok(())
}

fn reward_for(amount: u64, apy: Decimal, elapsed_secs: i64) -> Result<u64> {
    if elapsed_secs <= 0 || apy <= Decimal::ZERO {
        return Ok(0);
    }
    Decimal::from(amount)
        .checked_mul(apy)
        .and_then(|v| v.checked_mul(Decimal::from(elapsed_secs)))
        .and_then(|v| v.checked_div(Decimal::from(100)))
        .and_then(|v| v.checked_div(Decimal::from(SECONDS_PER_YEAR)))
        .and_then(|v| v.trunc().to_u64())
        .ok_or(GhostSpeakError::AmountOverflow)
}

fn estimated_apy(position: &StakingPosition) -> Decimal {
    let elapsed = (position.last_accrual_at - position.staked_at).num_seconds();
    if elapsed <= 0 || position.amount == 0 {
        return Decimal::ZERO;
    }
    let years = Decimal::from(elapsed) / Decimal::from(SECONDS_PER_YEAR);
    (Decimal::from(position.total_rewards) / Decimal::from(position.amount) / years * dec!(100))
        .round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ghostspeak_types::Address;

    const TOKEN: u64 = 1_000_000;

    fn ctx() -> CallContext {
        CallContext::new(Address::parse(&"S".repeat(32)).unwrap(), Utc::now())
    }

    fn engine() -> StakingEngine {
        StakingEngine::new(StakingConfig::default())
    }

    fn stake(amount_tokens: u64, lock_period: LockPeriod) -> (StakingPosition, CallContext) {
        let ctx = ctx();
        let position = engine()
            .stake(
                None,
                &StakeRequest {
                    amount: amount_tokens * TOKEN,
                    lock_period,
                },
                &ctx,
            )
            .unwrap();
        (position, ctx)
    }

    #[test]
    fn test_bronze_stake_unlocked() {
        let (position, ctx) = stake(5_000, LockPeriod::None);
        assert_eq!(position.tier, StakingTier::Bronze);
        assert_eq!(position.benefits.reputation_boost_percent, 5);
        assert_eq!(position.status, PositionStatus::Active);
        assert!(engine().can_unstake(&position, ctx.now));
        assert_eq!(position.amount_tokens(), "5000");
    }

    #[test]
    fn test_gold_stake_benefits() {
        let (position, _) = stake(150_000, LockPeriod::None);
        assert_eq!(position.tier, StakingTier::Gold);
        assert!(position.benefits.verified_badge);
        assert!(position.benefits.premium_benefits);
    }

    #[test]
    fn test_tier_boundaries() {
        let engine = engine();
        assert_eq!(engine.determine_tier(999 * TOKEN), None);
        assert_eq!(engine.determine_tier(1_000 * TOKEN), Some(StakingTier::Bronze));
        assert_eq!(engine.determine_tier(10_000 * TOKEN - 1), Some(StakingTier::Bronze));
        assert_eq!(engine.determine_tier(10_000 * TOKEN), Some(StakingTier::Silver));
        assert_eq!(engine.determine_tier(100_000 * TOKEN), Some(StakingTier::Gold));
    }

    #[test]
    fn test_below_minimum_rejected() {
        let err = engine()
            .stake(
                None,
                &StakeRequest {
                    amount: 999 * TOKEN,
                    lock_period: LockPeriod::None,
                },
                &ctx(),
            )
            .unwrap_err();
        assert!(matches!(err, GhostSpeakError::StakeBelowMinimum { .. }));
    }

    #[test]
    fn test_already_staked_rejected_until_unstaked() {
        let (position, ctx) = stake(2_000, LockPeriod::None);
        let request = StakeRequest {
            amount: 2_000 * TOKEN,
            lock_period: LockPeriod::None,
        };
        let err = engine().stake(Some(&position), &request, &ctx).unwrap_err();
        assert!(matches!(err, GhostSpeakError::AlreadyStaked { .. }));

        let (closed, _) = engine().unstake(&position, &ctx).unwrap();
        let reopened = engine().stake(Some(&closed), &request, &ctx).unwrap();
        assert_ne!(reopened.id, closed.id);
    }

    #[test]
    fn test_locked_stake() {
        let (position, ctx) = stake(1_000, LockPeriod::Days30);
        assert_eq!(position.status, PositionStatus::Locked);
        assert_eq!(position.unlock_at, ctx.now + Duration::days(30));
        assert_eq!(position.current_apy, dec!(11));
        assert!(!engine().can_unstake(&position, ctx.now + Duration::days(29)));

        let err = engine().unstake(&position, &ctx).unwrap_err();
        assert!(matches!(err, GhostSpeakError::LockPeriodActive { .. }));

        let later = ctx.at(ctx.now + Duration::days(30));
        assert!(engine().can_unstake(&position, later.now));
        let accrued = engine().accrue_rewards(&position, later.now).unwrap();
        assert_eq!(accrued.status, PositionStatus::Active);
    }

    #[test]
    fn test_one_year_accrual() {
        let (position, ctx) = stake(10_000, LockPeriod::None);
        let year_later = ctx.now + Duration::seconds(SECONDS_PER_YEAR);
        let accrued = engine().accrue_rewards(&position, year_later).unwrap();
        // 10% of 10,000 tokens
        assert_eq!(accrued.total_rewards, 1_000 * TOKEN);
        assert_eq!(accrued.unclaimed_rewards, 1_000 * TOKEN);
        assert_eq!(accrued.estimated_apy, dec!(10));
        assert!(accrued.rewards_balanced());
    }

    #[test]
    fn test_accrual_idempotent_at_same_instant() {
        let (position, ctx) = stake(10_000, LockPeriod::None);
        let t = ctx.now + Duration::days(10);
        let once = engine().accrue_rewards(&position, t).unwrap();
        let twice = engine().accrue_rewards(&once, t).unwrap();
        assert_eq!(once.total_rewards, twice.total_rewards);
        assert_eq!(engine().preview_rewards(&once, t).unwrap(), 0);
    }

    #[test]
    fn test_reward_overflow_is_an_error() {
        let (mut position, ctx) = stake(10_000, LockPeriod::None);
        position.amount = u64::MAX;
        let far = ctx.now + Duration::days(365 * 200);

        assert_eq!(
            engine().preview_rewards(&position, far).unwrap_err(),
            GhostSpeakError::AmountOverflow
        );
        assert_eq!(
            engine().accrue_rewards(&position, far).unwrap_err(),
            GhostSpeakError::AmountOverflow
        );
    }

    #[test]
    fn test_claim_rewards() {
        let (position, ctx) = stake(10_000, LockPeriod::None);
        let err = engine().claim_rewards(&position, &ctx).unwrap_err();
        assert_eq!(err, GhostSpeakError::NoRewardsToClaim);

        let later = ctx.at(ctx.now + Duration::days(30));
        let (claimed, amount) = engine().claim_rewards(&position, &later).unwrap();
        assert!(amount > 0);
        assert_eq!(claimed.claimed_rewards, amount);
        assert_eq!(claimed.unclaimed_rewards, 0);
        assert_eq!(claimed.status, PositionStatus::Active);
        assert!(claimed.rewards_balanced());
    }

    #[test]
    fn test_unstake_settles_principal_and_rewards() {
        let (position, ctx) = stake(10_000, LockPeriod::None);
        let later = ctx.at(ctx.now + Duration::seconds(SECONDS_PER_YEAR));
        let (closed, settlement) = engine().unstake(&position, &later).unwrap();
        assert_eq!(closed.status, PositionStatus::Unstaked);
        assert_eq!(settlement.principal, 10_000 * TOKEN);
        assert_eq!(settlement.rewards, 1_000 * TOKEN);
        assert_eq!(settlement.total, 11_000 * TOKEN);
        assert!(closed.rewards_balanced());

        let err = engine().unstake(&closed, &later).unwrap_err();
        assert!(matches!(err, GhostSpeakError::AlreadyUnstaked { .. }));
        assert!(!engine().can_unstake(&closed, later.now));
    }

    #[test]
    fn test_other_caller_cannot_unstake() {
        let (position, ctx) = stake(1_000, LockPeriod::None);
        let intruder = CallContext::new(Address::parse(&"T".repeat(32)).unwrap(), ctx.now);
        let err = engine().unstake(&position, &intruder).unwrap_err();
        assert!(matches!(err, GhostSpeakError::Unauthorized { .. }));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::Duration;
    use ghostspeak_types::Address;
    use proptest::prelude::*;

    proptest! {
        /// Claimed plus unclaimed always equals total.
        #[test]
        fn rewards_are_conserved(
            tokens in 1_000u64..10_000_000,
            steps in proptest::collection::vec((0i64..5_000_000, any::<bool>()), 1..12),
        ) {
            let engine = StakingEngine::default();
            let start = Utc::now();
            let ctx = CallContext::new(Address::parse(&"S".repeat(32)).unwrap(), start);
            let mut position = engine
                .stake(None, &StakeRequest { amount: tokens * 1_000_000, lock_period: LockPeriod::None }, &ctx)
                .unwrap();
            let mut now = start;
            for (advance, claim) in steps {
                now = now + Duration::seconds(advance);
                position = engine.accrue_rewards(&position, now).unwrap();
                prop_assert!(position.rewards_balanced());
                if claim {
                    if let Ok((next, _)) = engine.claim_rewards(&position, &ctx.at(now)) {
                        position = next;
                    }
                    prop_assert!(position.rewards_balanced());
                }
            }
            let (closed, _) = engine.unstake(&position, &ctx.at(now)).unwrap();
            prop_assert!(closed.rewards_balanced());
            prop_assert_eq!(closed.unclaimed_rewards, 0);
        }
    }
}
