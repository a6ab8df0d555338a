//! GhostSpeak SDK - local bookkeeping for the agent-commerce rules layer
//!
//! The SDK wires the four rules engines to the capability adapters:
//!
//! - [`RecordBook`] loads a record from a [`KeyValueStore`], applies an engine
//!   operation, and writes the result back, one in-flight mutation per key
//! - [`Gateway`] unlocks a wallet and submits ledger operations with bounded retry
//!
//! Everything the book stores is a *preview*. The ledger stays authoritative;
//! reconciling against confirmed state is the transport layer's job.
//!
//! # Quick Start
//!
//! ```ignore
//! use ghostspeak_sdk::{CallContext, RecordBook, StakeRequest, LockPeriod};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let book = RecordBook::local()?;
//!     let ctx = CallContext::new(staker, chrono::Utc::now());
//!
//!     let position = book
//!         .stake(&StakeRequest { amount: 5_000_000_000, lock_period: LockPeriod::None }, &ctx)
//!         .await?;
//!     println!("tier: {:?}", position.tier);
//!     Ok(())
//! }
//! ```

pub mod book;
pub mod gateway;

pub use ghostspeak_adapters::*;
pub use ghostspeak_escrow::*;
pub use ghostspeak_governance::*;
pub use ghostspeak_reputation::*;
pub use ghostspeak_staking::*;
pub use ghostspeak_types::*;

pub use book::RecordBook;
pub use gateway::Gateway;

use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// SDK configuration
#[derive(Debug, Clone, Default)]
pub struct SdkConfig {
    /// Protocol parameters mirrored from the ledger
    pub protocol: ProtocolConfig,
    /// Ledger submission settings
    pub submit: SubmitConfig,
}

impl SdkConfig {
    /// Defaults overlaid with `GHOSTSPEAK_*` environment variables
    pub fn from_env() -> Self {
        Self {
            protocol: ProtocolConfig::from_env(),
            submit: SubmitConfig::default(),
        }
    }
}

/// Ledger submission settings
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts, including the first
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based), doubling up to `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert!(config.protocol.validate().is_ok());
        assert_eq!(config.submit.timeout, Duration::from_secs(30));
        assert_eq!(config.submit.retry.max_attempts, 3);
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(350));
        assert_eq!(retry.delay_for(40), Duration::from_millis(350));
    }
}
