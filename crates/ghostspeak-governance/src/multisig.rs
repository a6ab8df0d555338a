//! Multisig wallets and their transactions

use chrono::{DateTime, Utc};
use ghostspeak_types::{Address, CallContext, GhostSpeakError, MultisigTxId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::engine::GovernanceEngine;

/// An M-of-N wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigWallet {
    pub address: Address,
    /// Ordered, unique
    pub owners: Vec<Address>,
    /// Approvals needed to execute, `1..=owners.len()`
    pub threshold: usize,
    /// Transactions submitted
    pub proposal_count: u64,
    /// Transactions executed
    pub execution_count: u64,
    /// Treasury balance in base units
    pub treasury_balance: u64,
    pub created_at: DateTime<Utc>,
}

impl MultisigWallet {
    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }
}

/// What a multisig transaction does when executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MultisigAction {
    /// Pay out of the treasury
    Transfer { recipient: Address, amount: u64 },
    /// Credit the treasury
    Deposit { amount: u64 },
    /// Opaque instruction executed on the ledger
    Custom { instruction: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigTransaction {
    pub id: MultisigTxId,
    pub wallet: Address,
    pub proposer: Address,
    pub action: MultisigAction,
    pub approvals: Vec<Address>,
    pub executed: bool,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl MultisigTransaction {
    pub fn approval_count(&self) -> usize {
        self.approvals.len()
    }
}

impl GovernanceEngine {
    /// Validate owners and threshold and build the wallet
    pub fn create_multisig(
        &self,
        address: Address,
        owners: Vec<Address>,
        threshold: usize,
        now: DateTime<Utc>,
    ) -> Result<MultisigWallet> {
        let (min, max) = (self.config.min_multisig_owners, self.config.max_multisig_owners);
        if owners.len() < min || owners.len() > max {
            return Err(GhostSpeakError::InvalidMultisig {
                reason: format!("needs {} to {} owners, got {}", min, max, owners.len()),
            });
        }
        let mut seen = HashSet::with_capacity(owners.len());
        if let Some(duplicate) = owners.iter().find(|owner| !seen.insert(*owner)) {
            return Err(GhostSpeakError::InvalidMultisig {
                reason: format!("owner {} listed more than once", duplicate),
            });
        }
        if threshold == 0 || threshold > owners.len() {
            return Err(GhostSpeakError::InvalidMultisig {
                reason: format!("threshold must be between 1 and {}", owners.len()),
            });
        }

        info!(address = %address, owners = owners.len(), threshold, "multisig created");
        Ok(MultisigWallet {
            address,
            owners,
            threshold,
            proposal_count: 0,
            execution_count: 0,
            treasury_balance: 0,
            created_at: now,
        })
    }

    /// Submit a transaction; the submitting owner's approval is recorded
    pub fn submit_transaction(
        &self,
        wallet: &MultisigWallet,
        action: MultisigAction,
        ctx: &CallContext,
    ) -> Result<(MultisigWallet, MultisigTransaction)> {
        ensure_owner(wallet, ctx)?;
        match &action {
            MultisigAction::Transfer { amount: 0, .. } | MultisigAction::Deposit { amount: 0 } => {
                return Err(GhostSpeakError::invalid_input("amount", "must be positive"));
            }
            MultisigAction::Custom { instruction } if instruction.trim().is_empty() => {
                return Err(GhostSpeakError::invalid_input("instruction", "must not be empty"));
            }
            _ => {}
        }

        let mut next = wallet.clone();
        next.proposal_count += 1;
        let tx = MultisigTransaction {
            id: MultisigTxId::new(),
            wallet: wallet.address.clone(),
            proposer: ctx.caller.clone(),
            action,
            approvals: vec![ctx.caller.clone()],
            executed: false,
            created_at: ctx.now,
            executed_at: None,
        };

        info!(tx_id = %tx.id, wallet = %next.address, proposer = %tx.proposer, "multisig transaction submitted");
        Ok((next, tx))
    }

    /// Add the caller's approval
    pub fn approve_transaction(
        &self,
        wallet: &MultisigWallet,
        tx: &MultisigTransaction,
        ctx: &CallContext,
    ) -> Result<MultisigTransaction> {
        ensure_owner(wallet, ctx)?;
        ensure_pending(wallet, tx)?;
        if tx.approvals.contains(&ctx.caller) {
            return Err(GhostSpeakError::AlreadyApproved {
                tx_id: tx.id.to_string(),
                owner: ctx.caller.to_string(),
            });
        }

        let mut next = tx.clone();
        next.approvals.push(ctx.caller.clone());
        debug!(tx_id = %next.id, approvals = next.approval_count(), threshold = wallet.threshold, "multisig approval");
        Ok(next)
    }

    /// Execute once approvals reach the threshold
    pub fn execute_transaction(
        &self,
        wallet: &MultisigWallet,
        tx: &MultisigTransaction,
        ctx: &CallContext,
    ) -> Result<(MultisigWallet, MultisigTransaction)> {
        ensure_owner(wallet, ctx)?;
        ensure_pending(wallet, tx)?;
        // Only approvals from current owners count.
        let approvals = tx.approvals.iter().filter(|a| wallet.is_owner(a)).count();
        if approvals < wallet.threshold {
            return Err(GhostSpeakError::ThresholdNotMet {
                tx_id: tx.id.to_string(),
                approvals,
                threshold: wallet.threshold,
            });
        }

        let mut next_wallet = wallet.clone();
        match &tx.action {
            MultisigAction::Transfer { amount, .. } => {
                next_wallet.treasury_balance = wallet
                    .treasury_balance
                    .checked_sub(*amount)
                    .ok_or(GhostSpeakError::InsufficientTreasury {
                        available: wallet.treasury_balance,
                        requested: *amount,
                    })?;
            }
            MultisigAction::Deposit { amount } => {
                next_wallet.treasury_balance = wallet
                    .treasury_balance
                    .checked_add(*amount)
                    .ok_or(GhostSpeakError::AmountOverflow)?;
            }
            MultisigAction::Custom { .. } => {}
        }
        next_wallet.execution_count += 1;

        let mut next_tx = tx.clone();
        next_tx.executed = true;
        next_tx.executed_at = Some(ctx.now);

        info!(
            tx_id = %next_tx.id,
            wallet = %next_wallet.address,
            treasury = next_wallet.treasury_balance,
            "multisig transaction executed"
        );
        Ok((next_wallet, next_tx))
    }
}

fn ensure_owner(wallet: &MultisigWallet, ctx: &CallContext) -> Result<()> {
    if !wallet.is_owner(&ctx.caller) {
        return Err(GhostSpeakError::unauthorized(format!(
            "{} is not an owner of multisig {}",
            ctx.caller, wallet.address
        )));
    }
    Ok(())
}

fn ensure_pending(wallet: &MultisigWallet, tx: &MultisigTransaction) -> Result<()> {
    if tx.wallet != wallet.address {
        return Err(GhostSpeakError::MultisigTxNotFound {
            tx_id: tx.id.to_string(),
        });
    }
    if tx.executed {
        return Err(GhostSpeakError::MultisigTxAlreadyExecuted {
            tx_id: tx.id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(c: char) -> Address {
        Address::parse(&c.to_string().repeat(32)).unwrap()
    }

    fn owners(cs: &str) -> Vec<Address> {
        cs.chars().map(addr).collect()
    }

    fn wallet(engine: &GovernanceEngine) -> MultisigWallet {
        engine
            .create_multisig(addr('W'), owners("ABC"), 2, Utc::now())
            .unwrap()
    }

    #[test]
    fn test_create_multisig_bounds() {
        let engine = GovernanceEngine::default();
        let now = Utc::now();
        assert!(engine.create_multisig(addr('W'), owners("A"), 1, now).is_err());
        assert!(engine.create_multisig(addr('W'), owners("AB"), 2, now).is_ok());
        assert!(engine.create_multisig(addr('W'), owners("ABCDEFGHJK"), 10, now).is_ok());
        assert!(engine.create_multisig(addr('W'), owners("ABCDEFGHJKL"), 1, now).is_err());
        assert!(engine.create_multisig(addr('W'), owners("AB"), 0, now).is_err());
        assert!(engine.create_multisig(addr('W'), owners("AB"), 3, now).is_err());

        let err = engine.create_multisig(addr('W'), owners("ABA"), 2, now).unwrap_err();
        assert!(matches!(err, GhostSpeakError::InvalidMultisig { .. }));
    }

    #[test]
    fn test_deposit_then_transfer() {
        let engine = GovernanceEngine::default();
        let w = wallet(&engine);
        let a = CallContext::new(addr('A'), w.created_at);
        let b = CallContext::new(addr('B'), w.created_at);

        let (w, deposit) = engine
            .submit_transaction(&w, MultisigAction::Deposit { amount: 5_000 }, &a)
            .unwrap();
        let err = engine.execute_transaction(&w, &deposit, &a).unwrap_err();
        assert!(matches!(
            err,
            GhostSpeakError::ThresholdNotMet { approvals: 1, threshold: 2, .. }
        ));

        let deposit = engine.approve_transaction(&w, &deposit, &b).unwrap();
        let (w, deposit) = engine.execute_transaction(&w, &deposit, &b).unwrap();
        assert!(deposit.executed);
        assert_eq!(w.treasury_balance, 5_000);
        assert_eq!(w.execution_count, 1);

        let err = engine.execute_transaction(&w, &deposit, &a).unwrap_err();
        assert!(matches!(err, GhostSpeakError::MultisigTxAlreadyExecuted { .. }));

        let transfer = MultisigAction::Transfer {
            recipient: addr('R'),
            amount: 6_000,
        };
        let (w, tx) = engine.submit_transaction(&w, transfer, &a).unwrap();
        assert_eq!(w.proposal_count, 2);
        let tx = engine.approve_transaction(&w, &tx, &b).unwrap();
        let err = engine.execute_transaction(&w, &tx, &a).unwrap_err();
        assert!(matches!(err, GhostSpeakError::InsufficientTreasury { .. }));
    }

    #[test]
    fn test_approval_rules() {
        let engine = GovernanceEngine::default();
        let w = wallet(&engine);
        let a = CallContext::new(addr('A'), w.created_at);
        let outsider = CallContext::new(addr('Z'), w.created_at);

        let err = engine
            .submit_transaction(&w, MultisigAction::Deposit { amount: 1 }, &outsider)
            .unwrap_err();
        assert!(matches!(err, GhostSpeakError::Unauthorized { .. }));

        let (w, tx) = engine
            .submit_transaction(&w, MultisigAction::Custom { instruction: "pause".into() }, &a)
            .unwrap();
        let err = engine.approve_transaction(&w, &tx, &a).unwrap_err();
        assert!(matches!(err, GhostSpeakError::AlreadyApproved { .. }));
        assert!(engine.approve_transaction(&w, &tx, &outsider).is_err());
    }
}
