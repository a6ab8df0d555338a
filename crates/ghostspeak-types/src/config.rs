//! Protocol configuration
//!
//! The parameters the ledger enforces, mirrored locally so previews match.
//! Defaults track mainnet; `from_env` lets a deployment override individual
//! values without a config file.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Address, GhostSpeakError, Result, TokenTable, MAX_DECIMALS};

/// Top-level protocol configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Staking parameters
    pub staking: StakingConfig,
    /// Escrow parameters
    pub escrow: EscrowConfig,
    /// Governance parameters
    pub governance: GovernanceConfig,
    /// Tokens available on the current network
    pub tokens: TokenTable,
}

/// Staking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Minimum stake in whole tokens
    pub min_stake_tokens: u64,
    /// Decimals of the staking token
    pub token_decimals: u8,
    /// Base annual percentage yield before lock bonuses (10 = 10%)
    pub base_apy: Decimal,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_stake_tokens: 1_000,
            token_decimals: 6,
            base_apy: dec!(10),
        }
    }
}

/// Escrow parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Smallest amount (in base units) an escrow may hold
    pub min_amount_units: u64,
    /// Maximum description length in characters
    pub max_description_len: usize,
    /// Maximum evidence references on a dispute
    pub max_evidence: usize,
    /// Maximum length of a single evidence reference
    pub max_evidence_len: usize,
    /// Platform arbiters allowed to resolve disputes without a mediator
    pub arbiters: Vec<Address>,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            min_amount_units: 1_000,
            max_description_len: 500,
            max_evidence: 10,
            max_evidence_len: 200,
            arbiters: Vec::new(),
        }
    }
}

/// Governance parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Delay between proposal creation and the start of voting
    pub voting_grace_secs: i64,
    /// Shortest allowed voting period
    pub min_voting_period_secs: i64,
    /// Longest allowed voting period
    pub max_voting_period_secs: i64,
    /// Quorum used when a proposal does not specify one
    pub default_quorum: u64,
    /// Maximum proposal title length
    pub max_title_len: usize,
    /// Maximum proposal description length
    pub max_description_len: usize,
    /// Multisig owner count bounds
    pub min_multisig_owners: usize,
    pub max_multisig_owners: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_grace_secs: 3_600,
            min_voting_period_secs: 86_400,
            max_voting_period_secs: 2_592_000,
            default_quorum: 1_000,
            max_title_len: 200,
            max_description_len: 2_000,
            min_multisig_owners: 2,
            max_multisig_owners: 10,
        }
    }
}

impl ProtocolConfig {
    /// Defaults overlaid with `GHOSTSPEAK_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.staking.base_apy = env_or("GHOSTSPEAK_BASE_APY", config.staking.base_apy);
        config.staking.min_stake_tokens =
            env_or("GHOSTSPEAK_MIN_STAKE_TOKENS", config.staking.min_stake_tokens);
        config.staking.token_decimals =
            env_or("GHOSTSPEAK_STAKING_DECIMALS", config.staking.token_decimals);
        config.escrow.min_amount_units =
            env_or("GHOSTSPEAK_MIN_ESCROW_UNITS", config.escrow.min_amount_units);
        config.escrow.arbiters = addresses_or("GHOSTSPEAK_ESCROW_ARBITERS", config.escrow.arbiters);
        config.governance.voting_grace_secs =
            env_or("GHOSTSPEAK_VOTING_GRACE_SECS", config.governance.voting_grace_secs);
        config.governance.default_quorum =
            env_or("GHOSTSPEAK_DEFAULT_QUORUM", config.governance.default_quorum);
        config
    }

    /// Reject incoherent parameter sets
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| {
            Err(GhostSpeakError::invalid_input(
                format!("config.{}", field),
                reason.to_string(),
            ))
        };

        if self.staking.min_stake_tokens == 0 {
            return invalid("staking.min_stake_tokens", "must be positive");
        }
        if self.staking.token_decimals == 0 || self.staking.token_decimals > MAX_DECIMALS {
            return invalid("staking.token_decimals", "must be between 1 and 19");
        }
        if self.staking.base_apy.is_sign_negative() {
            return invalid("staking.base_apy", "must not be negative");
        }
        if self.escrow.min_amount_units == 0 {
            return invalid("escrow.min_amount_units", "must be positive");
        }
        let gov = &self.governance;
        if gov.voting_grace_secs < 0 {
            return invalid("governance.voting_grace_secs", "must not be negative");
        }
        if gov.min_voting_period_secs <= 0 || gov.min_voting_period_secs > gov.max_voting_period_secs {
            return invalid(
                "governance.min_voting_period_secs",
                "must be positive and not above the maximum",
            );
        }
        if gov.default_quorum == 0 {
            return invalid("governance.default_quorum", "must be positive");
        }
        if gov.min_multisig_owners < 1 || gov.min_multisig_owners > gov.max_multisig_owners {
            return invalid(
                "governance.min_multisig_owners",
                "must be at least 1 and not above the maximum",
            );
        }
        Ok(())
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, fallback = %default, "ignoring unparsable config override");
                default
            }
        },
        Err(_) => default,
    }
}

/// Comma-separated addresses; one malformed entry discards the override
fn addresses_or(key: &str, default: Vec<Address>) -> Vec<Address> {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    let parsed: Result<Vec<Address>> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(Address::parse)
        .collect();
    match parsed {
        Ok(addresses) => addresses,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring unparsable address list");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.staking.min_stake_tokens, 1_000);
        assert_eq!(config.governance.min_voting_period_secs, 86_400);
        assert_eq!(config.governance.max_voting_period_secs, 2_592_000);
        assert_eq!(config.escrow.max_description_len, 500);
    }

    #[test]
    fn test_validate_rejects_inverted_voting_bounds() {
        let mut config = ProtocolConfig::default();
        config.governance.min_voting_period_secs = 3_000_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_and_fallback() {
        std::env::set_var("GHOSTSPEAK_TEST_ONLY_QUORUM", "42");
        assert_eq!(env_or("GHOSTSPEAK_TEST_ONLY_QUORUM", 7u64), 42);
        std::env::set_var("GHOSTSPEAK_TEST_ONLY_QUORUM", "not-a-number");
        assert_eq!(env_or("GHOSTSPEAK_TEST_ONLY_QUORUM", 7u64), 7);
        std::env::remove_var("GHOSTSPEAK_TEST_ONLY_QUORUM");
        assert_eq!(env_or("GHOSTSPEAK_TEST_ONLY_QUORUM", 7u64), 7);
    }

    #[test]
    fn test_address_list_override() {
        let a = "A".repeat(32);
        let b = "B".repeat(32);
        std::env::set_var("GHOSTSPEAK_TEST_ONLY_ARBITERS", format!("{}, {},", a, b));
        let arbiters = addresses_or("GHOSTSPEAK_TEST_ONLY_ARBITERS", Vec::new());
        assert_eq!(arbiters.len(), 2);
        assert_eq!(arbiters[1].to_string(), b);

        std::env::set_var("GHOSTSPEAK_TEST_ONLY_ARBITERS", format!("{},not-an-address!", a));
        assert!(addresses_or("GHOSTSPEAK_TEST_ONLY_ARBITERS", Vec::new()).is_empty());
        std::env::remove_var("GHOSTSPEAK_TEST_ONLY_ARBITERS");
    }

    #[test]
    fn test_config_serde() {
        let config = ProtocolConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
