//! RecordBook: engine operations over a key-value store
//!
//! Every mutation follows the same shape: take the key's lock, load the
//! latest record, run the pure engine operation, write the result. A failed
//! operation writes nothing, so the stored record is untouched. Operations
//! that write two keys restore the first if the second write fails.
//!
//! # Keys
//!
//! ```text
//! reputation:<address>        ReputationRecord
//! staking:<address>           StakingPosition (latest, possibly unstaked)
//! escrow:<escrow id>          Escrow
//! proposal:<proposal id>      Proposal
//! vote:<proposal id>:<voter>  Vote
//! multisig:<address>          MultisigWallet
//! multisig_tx:<tx id>         MultisigTransaction
//! roles                       RoleRegistry
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use ghostspeak_adapters::{KeyValueStore, LocalSimKeyValueStore};
use ghostspeak_escrow::{
    CreateEscrowRequest, DisputeRequest, Escrow, EscrowEngine, Resolution, Settlement,
};
use ghostspeak_governance::{
    CreateProposalRequest, GovernanceEngine, GrantRoleRequest, MultisigAction,
    MultisigTransaction, MultisigWallet, Proposal, ProposalStatus, Role, RoleRegistry, Vote,
    VoteRequest,
};
use ghostspeak_reputation::{IntegrationEvent, JobCompletion, ReputationEngine, ReputationRecord};
use ghostspeak_staking::{StakeRequest, StakingEngine, StakingPosition, UnstakeSettlement};
use ghostspeak_types::{
    Address, CallContext, EscrowId, GhostSpeakError, MultisigTxId, ProposalId, ProtocolConfig,
    Result,
};

const REPUTATION_PREFIX: &str = "reputation:";
const STAKING_PREFIX: &str = "staking:";
const ESCROW_PREFIX: &str = "escrow:";
const PROPOSAL_PREFIX: &str = "proposal:";
const VOTE_PREFIX: &str = "vote:";
const MULTISIG_PREFIX: &str = "multisig:";
const MULTISIG_TX_PREFIX: &str = "multisig_tx:";
const ROLES_KEY: &str = "roles";

fn reputation_key(subject: &Address) -> String {
    format!("{}{}", REPUTATION_PREFIX, subject)
}

fn staking_key(staker: &Address) -> String {
    format!("{}{}", STAKING_PREFIX, staker)
}

fn escrow_key(id: &EscrowId) -> String {
    format!("{}{}", ESCROW_PREFIX, id)
}

fn proposal_key(id: &ProposalId) -> String {
    format!("{}{}", PROPOSAL_PREFIX, id)
}

fn votes_prefix(proposal_id: &ProposalId) -> String {
    format!("{}{}:", VOTE_PREFIX, proposal_id)
}

fn vote_key(proposal_id: &ProposalId, voter: &Address) -> String {
    format!("{}{}", votes_prefix(proposal_id), voter)
}

fn multisig_key(address: &Address) -> String {
    format!("{}{}", MULTISIG_PREFIX, address)
}

fn multisig_tx_key(id: &MultisigTxId) -> String {
    format!("{}{}", MULTISIG_TX_PREFIX, id)
}

/// Local bookkeeping over the four engines
pub struct RecordBook {
    store: Arc<dyn KeyValueStore>,
    reputation: ReputationEngine,
    staking: StakingEngine,
    escrow: EscrowEngine,
    governance: GovernanceEngine,
    /// One mutex per key; a mutation holds its key's guard end to end
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of a mutation; the key's mutex is evicted on drop
/// once nobody else holds or awaits it
struct KeyGuard {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl RecordBook {
    /// Build a book over `store`, rejecting an incoherent config
    pub fn new(store: Arc<dyn KeyValueStore>, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            reputation: ReputationEngine::new(),
            staking: StakingEngine::new(config.staking.clone()),
            escrow: EscrowEngine::new(config.escrow.clone(), config.tokens.clone()),
            governance: GovernanceEngine::new(config.governance),
            locks: Arc::new(DashMap::new()),
        })
    }

    /// In-memory book with default protocol parameters
    pub fn local() -> Result<Self> {
        Self::new(Arc::new(LocalSimKeyValueStore::new()), ProtocolConfig::default())
    }

    pub fn staking_engine(&self) -> &StakingEngine {
        &self.staking
    }

    pub fn escrow_engine(&self) -> &EscrowEngine {
        &self.escrow
    }

    pub fn governance_engine(&self) -> &GovernanceEngine {
        &self.governance
    }

    // ========================================================================
    // Storage plumbing
    // ========================================================================

    async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        KeyGuard {
            locks: self.locks.clone(),
            key: key.to_string(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    /// Keys with a live or awaited lock
    pub fn locked_keys(&self) -> usize {
        self.locks.len()
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn load_or<T: DeserializeOwned>(
        &self,
        key: &str,
        not_found: impl FnOnce() -> GhostSpeakError,
    ) -> Result<T> {
        self.load(key).await?.ok_or_else(not_found)
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, raw).await?;
        debug!(key, "record saved");
        Ok(())
    }

    /// Write `first`, then `second`; if the second write fails the first key
    /// is put back to what it held before
    async fn save_both<A: Serialize, B: Serialize>(
        &self,
        first: (&str, &A),
        second: (&str, &B),
    ) -> Result<()> {
        let (first_key, first_value) = first;
        let previous = self.store.get(first_key).await?;
        self.save(first_key, first_value).await?;
        if let Err(e) = self.save(second.0, second.1).await {
            let restored = match previous {
                Some(raw) => self.store.set(first_key, raw).await,
                None => self.store.delete(first_key).await.map(|_| ()),
            };
            if let Err(restore_err) = restored {
                warn!(key = first_key, error = %restore_err, "failed to restore record after partial write");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn load_all<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let keys = self.store.keys_by_prefix(prefix).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            // A key can expire between listing and reading.
            if let Some(record) = self.load(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Load, apply, save under the key's lock
    async fn update<T, R>(
        &self,
        key: &str,
        not_found: impl FnOnce() -> GhostSpeakError,
        apply: impl FnOnce(&T) -> Result<(T, R)>,
    ) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.lock(key).await;
        let current: T = self.load_or(key, not_found).await?;
        let (next, output) = apply(&current)?;
        self.save(key, &next).await?;
        Ok(output)
    }

    // ========================================================================
    // Reputation
    // ========================================================================

    pub async fn reputation(&self, subject: &Address) -> Result<ReputationRecord> {
        self.load_or(&reputation_key(subject), || GhostSpeakError::ReputationNotFound {
            subject: subject.to_string(),
        })
        .await
    }

    /// Load the subject's record, creating it on first observed activity
    async fn update_reputation(
        &self,
        subject: &Address,
        now: DateTime<Utc>,
        apply: impl FnOnce(&ReputationRecord) -> Result<ReputationRecord>,
    ) -> Result<ReputationRecord> {
        let key = reputation_key(subject);
        let _guard = self.lock(&key).await;
        let current = match self.load(&key).await? {
            Some(record) => record,
            None => ReputationRecord::new(subject.clone(), now),
        };
        let next = apply(&current)?;
        self.save(&key, &next).await?;
        Ok(next)
    }

    pub async fn record_job_completion(
        &self,
        subject: &Address,
        job: &JobCompletion,
        now: DateTime<Utc>,
    ) -> Result<ReputationRecord> {
        let engine = self.reputation;
        self.update_reputation(subject, now, |record| {
            engine.apply_job_completion(record, job, now)
        })
        .await
    }

    pub async fn record_job_failure(
        &self,
        subject: &Address,
        now: DateTime<Utc>,
    ) -> Result<ReputationRecord> {
        let engine = self.reputation;
        self.update_reputation(subject, now, |record| Ok(engine.apply_job_failure(record, now)))
            .await
    }

    pub async fn record_integration_event(
        &self,
        subject: &Address,
        event: &IntegrationEvent,
        now: DateTime<Utc>,
    ) -> Result<ReputationRecord> {
        let engine = self.reputation;
        self.update_reputation(subject, now, |record| {
            Ok(engine.apply_integration_event(record, event, now))
        })
        .await
    }

    // ========================================================================
    // Staking
    // ========================================================================

    pub async fn position(&self, staker: &Address) -> Result<StakingPosition> {
        self.load_or(&staking_key(staker), || GhostSpeakError::PositionNotFound {
            staker: staker.to_string(),
        })
        .await
    }

    /// Open a position for `ctx.caller`, replacing an unstaked one
    pub async fn stake(&self, request: &StakeRequest, ctx: &CallContext) -> Result<StakingPosition> {
        let key = staking_key(&ctx.caller);
        let _guard = self.lock(&key).await;
        let existing: Option<StakingPosition> = self.load(&key).await?;
        let position = self.staking.stake(existing.as_ref(), request, ctx)?;
        self.save(&key, &position).await?;
        Ok(position)
    }

    /// Bring the staker's rewards up to `now` and persist them
    pub async fn accrue_rewards(&self, staker: &Address, now: DateTime<Utc>) -> Result<StakingPosition> {
        let staking = &self.staking;
        self.update(
            &staking_key(staker),
            || GhostSpeakError::PositionNotFound {
                staker: staker.to_string(),
            },
            |position: &StakingPosition| {
                let next = staking.accrue_rewards(position, now)?;
                Ok((next.clone(), next))
            },
        )
        .await
    }

    /// Claim every unclaimed reward; returns the amount claimed
    pub async fn claim_rewards(&self, ctx: &CallContext) -> Result<u64> {
        let staking = &self.staking;
        self.update(
            &staking_key(&ctx.caller),
            || GhostSpeakError::PositionNotFound {
                staker: ctx.caller.to_string(),
            },
            |position: &StakingPosition| staking.claim_rewards(position, ctx),
        )
        .await
    }

    pub async fn unstake(&self, ctx: &CallContext) -> Result<UnstakeSettlement> {
        let staking = &self.staking;
        self.update(
            &staking_key(&ctx.caller),
            || GhostSpeakError::PositionNotFound {
                staker: ctx.caller.to_string(),
            },
            |position: &StakingPosition| staking.unstake(position, ctx),
        )
        .await
    }

    // ========================================================================
    // Escrow
    // ========================================================================

    pub async fn escrow(&self, id: &EscrowId) -> Result<Escrow> {
        self.load_or(&escrow_key(id), || GhostSpeakError::EscrowNotFound {
            escrow_id: id.to_string(),
        })
        .await
    }

    /// Escrows where `party` is client or agent
    pub async fn escrows_for(&self, party: &Address) -> Result<Vec<Escrow>> {
        let escrows: Vec<Escrow> = self.load_all(ESCROW_PREFIX).await?;
        Ok(escrows.into_iter().filter(|e| e.is_party(party)).collect())
    }

    pub async fn create_escrow(&self, request: &CreateEscrowRequest, ctx: &CallContext) -> Result<Escrow> {
        let escrow = self.escrow.create(request, ctx)?;
        let key = escrow_key(&escrow.id);
        let _guard = self.lock(&key).await;
        self.save(&key, &escrow).await?;
        Ok(escrow)
    }

    async fn update_escrow(
        &self,
        id: &EscrowId,
        apply: impl FnOnce(&EscrowEngine, &Escrow) -> Result<Escrow>,
    ) -> Result<Escrow> {
        let engine = &self.escrow;
        self.update(
            &escrow_key(id),
            || GhostSpeakError::EscrowNotFound {
                escrow_id: id.to_string(),
            },
            |escrow: &Escrow| {
                let next = apply(engine, escrow)?;
                Ok((next.clone(), next))
            },
        )
        .await
    }

    pub async fn fund_escrow(&self, id: &EscrowId, ctx: &CallContext) -> Result<Escrow> {
        self.update_escrow(id, |engine, escrow| engine.fund(escrow, ctx)).await
    }

    pub async fn start_work(&self, id: &EscrowId, ctx: &CallContext) -> Result<Escrow> {
        self.update_escrow(id, |engine, escrow| engine.start_work(escrow, ctx)).await
    }

    pub async fn mark_completed(&self, id: &EscrowId, ctx: &CallContext) -> Result<Escrow> {
        self.update_escrow(id, |engine, escrow| engine.mark_completed(escrow, ctx)).await
    }

    pub async fn release_escrow(&self, id: &EscrowId, ctx: &CallContext) -> Result<Escrow> {
        self.update_escrow(id, |engine, escrow| engine.release(escrow, ctx)).await
    }

    pub async fn cancel_escrow(&self, id: &EscrowId, ctx: &CallContext) -> Result<Escrow> {
        self.update_escrow(id, |engine, escrow| engine.cancel(escrow, ctx)).await
    }

    pub async fn dispute_escrow(
        &self,
        id: &EscrowId,
        request: &DisputeRequest,
        ctx: &CallContext,
    ) -> Result<Escrow> {
        self.update_escrow(id, |engine, escrow| engine.dispute(escrow, request, ctx))
            .await
    }

    pub async fn submit_evidence(
        &self,
        id: &EscrowId,
        evidence: &[String],
        ctx: &CallContext,
    ) -> Result<Escrow> {
        self.update_escrow(id, |engine, escrow| engine.submit_evidence(escrow, evidence, ctx))
            .await
    }

    /// Resolve the dispute and return the resulting payout
    pub async fn resolve_dispute(
        &self,
        id: &EscrowId,
        resolution: Resolution,
        ctx: &CallContext,
    ) -> Result<(Escrow, Settlement)> {
        let escrow = self
            .update_escrow(id, |engine, escrow| engine.resolve_dispute(escrow, resolution, ctx))
            .await?;
        let settlement = self
            .escrow
            .settlement(&escrow)
            .ok_or_else(|| GhostSpeakError::DisputeNotFound {
                escrow_id: id.to_string(),
            })?;
        Ok((escrow, settlement))
    }

    // ========================================================================
    // Roles
    // ========================================================================

    /// Current registry; empty until bootstrapped
    pub async fn roles(&self) -> Result<RoleRegistry> {
        Ok(self.load(ROLES_KEY).await?.unwrap_or_default())
    }

    /// Seed the registry with its first admin. A no-op once seeded.
    pub async fn bootstrap_roles(&self, admin: &Address, now: DateTime<Utc>) -> Result<RoleRegistry> {
        let _guard = self.lock(ROLES_KEY).await;
        if let Some(existing) = self.load::<RoleRegistry>(ROLES_KEY).await? {
            debug!("role registry already bootstrapped");
            return Ok(existing);
        }
        let registry = RoleRegistry::bootstrap(admin.clone(), now);
        self.save(ROLES_KEY, &registry).await?;
        Ok(registry)
    }

    async fn update_roles(
        &self,
        apply: impl FnOnce(&RoleRegistry) -> Result<RoleRegistry>,
    ) -> Result<RoleRegistry> {
        let _guard = self.lock(ROLES_KEY).await;
        let current: RoleRegistry = self.load(ROLES_KEY).await?.unwrap_or_default();
        let next = apply(&current)?;
        self.save(ROLES_KEY, &next).await?;
        Ok(next)
    }

    pub async fn grant_role(&self, request: &GrantRoleRequest, ctx: &CallContext) -> Result<RoleRegistry> {
        self.update_roles(|roles| roles.grant_role(request, ctx)).await
    }

    pub async fn revoke_role(
        &self,
        address: &Address,
        role: Role,
        ctx: &CallContext,
    ) -> Result<RoleRegistry> {
        self.update_roles(|roles| roles.revoke_role(address, role, ctx)).await
    }

    /// Deactivate expired assignments; returns how many were swept
    pub async fn sweep_expired_roles(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut swept = 0;
        self.update_roles(|roles| {
            let (next, count) = roles.sweep_expired(now);
            swept = count;
            Ok(next)
        })
        .await?;
        Ok(swept)
    }

    /// Drop revoked and expired assignments; returns how many were removed
    pub async fn prune_roles(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut pruned = 0;
        self.update_roles(|roles| {
            let (next, count) = roles.prune_inactive(now);
            pruned = count;
            Ok(next)
        })
        .await?;
        Ok(pruned)
    }

    // ========================================================================
    // Proposals
    // ========================================================================

    pub async fn proposal(&self, id: &ProposalId) -> Result<Proposal> {
        self.load_or(&proposal_key(id), || GhostSpeakError::ProposalNotFound {
            proposal_id: id.to_string(),
        })
        .await
    }

    /// Active proposals first, then by creation time
    pub async fn proposals(&self) -> Result<Vec<Proposal>> {
        let mut proposals: Vec<Proposal> = self.load_all(PROPOSAL_PREFIX).await?;
        proposals.sort_by_key(|p| (p.status != ProposalStatus::Active, p.created_at));
        Ok(proposals)
    }

    pub async fn votes(&self, proposal_id: &ProposalId) -> Result<Vec<Vote>> {
        self.load_all(&votes_prefix(proposal_id)).await
    }

    pub async fn create_proposal(
        &self,
        request: &CreateProposalRequest,
        ctx: &CallContext,
    ) -> Result<Proposal> {
        let roles = self.roles().await?;
        let proposal = self.governance.create_proposal(&roles, request, ctx)?;
        let key = proposal_key(&proposal.id);
        let _guard = self.lock(&key).await;
        self.save(&key, &proposal).await?;
        Ok(proposal)
    }

    /// Cast the caller's vote; the proposal lock covers its vote keys
    pub async fn vote(
        &self,
        proposal_id: &ProposalId,
        request: &VoteRequest,
        ctx: &CallContext,
    ) -> Result<(Proposal, Vote)> {
        let key = proposal_key(proposal_id);
        let _guard = self.lock(&key).await;
        let proposal: Proposal = self
            .load_or(&key, || GhostSpeakError::ProposalNotFound {
                proposal_id: proposal_id.to_string(),
            })
            .await?;
        let ballot_key = vote_key(proposal_id, &ctx.caller);
        let existing: Option<Vote> = self.load(&ballot_key).await?;
        let (proposal, vote) = self
            .governance
            .vote(&proposal, existing.as_ref(), request, ctx)?;

        self.save_both((&ballot_key, &vote), (&key, &proposal)).await?;
        info!(proposal_id = %proposal_id, voter = %vote.voter, "vote recorded");
        Ok((proposal, vote))
    }

    async fn update_proposal(
        &self,
        id: &ProposalId,
        apply: impl FnOnce(&Proposal) -> Result<Proposal>,
    ) -> Result<Proposal> {
        self.update(
            &proposal_key(id),
            || GhostSpeakError::ProposalNotFound {
                proposal_id: id.to_string(),
            },
            |proposal: &Proposal| {
                let next = apply(proposal)?;
                Ok((next.clone(), next))
            },
        )
        .await
    }

    pub async fn finalize_proposal(&self, id: &ProposalId, now: DateTime<Utc>) -> Result<Proposal> {
        let engine = &self.governance;
        self.update_proposal(id, |proposal| engine.finalize(proposal, now)).await
    }

    pub async fn execute_proposal(&self, id: &ProposalId, ctx: &CallContext) -> Result<Proposal> {
        let engine = &self.governance;
        self.update_proposal(id, |proposal| engine.execute(proposal, ctx)).await
    }

    pub async fn cancel_proposal(&self, id: &ProposalId, ctx: &CallContext) -> Result<Proposal> {
        let roles = self.roles().await?;
        let engine = &self.governance;
        self.update_proposal(id, |proposal| engine.cancel(&roles, proposal, ctx))
            .await
    }

    // ========================================================================
    // Multisig
    // ========================================================================

    pub async fn multisig(&self, address: &Address) -> Result<MultisigWallet> {
        self.load_or(&multisig_key(address), || GhostSpeakError::MultisigNotFound {
            address: address.to_string(),
        })
        .await
    }

    pub async fn multisig_transaction(&self, id: &MultisigTxId) -> Result<MultisigTransaction> {
        self.load_or(&multisig_tx_key(id), || GhostSpeakError::MultisigTxNotFound {
            tx_id: id.to_string(),
        })
        .await
    }

    pub async fn create_multisig(
        &self,
        address: &Address,
        owners: Vec<Address>,
        threshold: usize,
        now: DateTime<Utc>,
    ) -> Result<MultisigWallet> {
        let key = multisig_key(address);
        let _guard = self.lock(&key).await;
        if self.store.get(&key).await?.is_some() {
            return Err(GhostSpeakError::InvalidMultisig {
                reason: format!("wallet {} already exists", address),
            });
        }
        let wallet = self
            .governance
            .create_multisig(address.clone(), owners, threshold, now)?;
        self.save(&key, &wallet).await?;
        Ok(wallet)
    }

    /// Submit a transaction; the submitter's approval is recorded with it
    pub async fn submit_multisig_transaction(
        &self,
        wallet: &Address,
        action: MultisigAction,
        ctx: &CallContext,
    ) -> Result<MultisigTransaction> {
        let wallet_key = multisig_key(wallet);
        let _guard = self.lock(&wallet_key).await;
        let current = self.multisig(wallet).await?;
        let (next, tx) = self.governance.submit_transaction(&current, action, ctx)?;
        self.save_both((&multisig_tx_key(&tx.id), &tx), (&wallet_key, &next))
            .await?;
        Ok(tx)
    }

    pub async fn approve_multisig_transaction(
        &self,
        tx_id: &MultisigTxId,
        ctx: &CallContext,
    ) -> Result<MultisigTransaction> {
        let tx_key = multisig_tx_key(tx_id);
        let _guard = self.lock(&tx_key).await;
        let tx = self.multisig_transaction(tx_id).await?;
        let wallet = self.multisig(&tx.wallet).await?;
        let next = self.governance.approve_transaction(&wallet, &tx, ctx)?;
        self.save(&tx_key, &next).await?;
        Ok(next)
    }

    /// Execute once approvals reach the threshold; locks wallet, then transaction
    pub async fn execute_multisig_transaction(
        &self,
        tx_id: &MultisigTxId,
        ctx: &CallContext,
    ) -> Result<(MultisigWallet, MultisigTransaction)> {
        let pending = self.multisig_transaction(tx_id).await?;
        let wallet_key = multisig_key(&pending.wallet);
        let tx_key = multisig_tx_key(tx_id);
        let _wallet_guard = self.lock(&wallet_key).await;
        let _tx_guard = self.lock(&tx_key).await;

        let wallet = self.multisig(&pending.wallet).await?;
        let tx = self.multisig_transaction(tx_id).await?;
        let (wallet, tx) = self.governance.execute_transaction(&wallet, &tx, ctx)?;
        self.save_both((&tx_key, &tx), (&wallet_key, &wallet)).await?;
        Ok((wallet, tx))
    }
}
