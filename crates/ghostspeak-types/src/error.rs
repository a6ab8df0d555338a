//! Error types for GhostSpeak
//!
//! Every failure is a typed, recoverable value. Nothing in the rules engines
//! is fatal: the caller decides whether to retry, prompt, or abort, using
//! [`GhostSpeakError::category`] to branch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for GhostSpeak operations
pub type Result<T> = std::result::Result<T, GhostSpeakError>;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or out-of-range input, rejected before any state is read
    Validation,
    /// Operation is illegal for the record's current status
    StateConflict,
    /// Referenced entity does not exist
    NotFound,
    /// Caller lacks the role, permission or party membership required
    Authorization,
    /// A business precondition (quorum, lock expiry, rewards) is not met yet
    PreconditionUnmet,
    /// An external capability (signer, ledger, storage) failed
    Capability,
}

/// GhostSpeak error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GhostSpeakError {
    // ========================================================================
    // Validation
    // ========================================================================

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    /// Amount overflow during arithmetic or parsing
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Token missing from the token table
    #[error("Token {symbol} is not configured for this network")]
    UnknownToken { symbol: String },

    /// Stake below the protocol minimum
    #[error("Stake of {provided} base units is below the minimum of {minimum}")]
    StakeBelowMinimum { minimum: u64, provided: u64 },

    /// Escrow amount below the protocol minimum
    #[error("Amount of {provided} base units is below the minimum of {minimum}")]
    AmountBelowMinimum { minimum: u64, provided: u64 },

    /// Voting period outside the allowed window
    #[error("Voting period of {seconds}s must be between {min}s and {max}s")]
    InvalidVotingPeriod { seconds: i64, min: i64, max: i64 },

    /// Multisig owner/threshold configuration rejected
    #[error("Invalid multisig configuration: {reason}")]
    InvalidMultisig { reason: String },

    // ========================================================================
    // State conflicts
    // ========================================================================

    /// Staker already holds a live position
    #[error("Staker {staker} already has an active staking position")]
    AlreadyStaked { staker: String },

    /// Position has already been unstaked
    #[error("Staking position {position_id} has already been unstaked")]
    AlreadyUnstaked { position_id: String },

    /// Escrow status does not allow the requested action
    #[error("Escrow {escrow_id} cannot {action} while {status}")]
    InvalidEscrowTransition {
        escrow_id: String,
        status: String,
        action: String,
    },

    /// Escrow already carries a dispute
    #[error("Escrow {escrow_id} already has a dispute")]
    DisputeAlreadyExists { escrow_id: String },

    /// Dispute is not open for evidence or resolution
    #[error("Dispute on escrow {escrow_id} is not open")]
    DisputeNotOpen { escrow_id: String },

    /// Voting window has closed
    #[error("Voting on proposal {proposal_id} closed at {ended_at}")]
    VotingClosed {
        proposal_id: String,
        ended_at: String,
    },

    /// Voting window has not opened yet
    #[error("Voting on proposal {proposal_id} opens at {starts_at}")]
    VotingNotStarted {
        proposal_id: String,
        starts_at: String,
    },

    /// Voter already cast a vote on this proposal
    #[error("{voter} has already voted on proposal {proposal_id}")]
    AlreadyVoted { proposal_id: String, voter: String },

    /// Proposal status does not allow the requested action
    #[error("Proposal {proposal_id} cannot {action} while {status}")]
    InvalidProposalTransition {
        proposal_id: String,
        status: String,
        action: String,
    },

    /// Voting window still open
    #[error("Voting on proposal {proposal_id} is open until {ends_at}")]
    VotingStillOpen {
        proposal_id: String,
        ends_at: String,
    },

    /// Role already active for this address
    #[error("{address} already holds role {role}")]
    RoleAlreadyAssigned { address: String, role: String },

    /// Multisig owner already approved this transaction
    #[error("{owner} already approved multisig transaction {tx_id}")]
    AlreadyApproved { tx_id: String, owner: String },

    /// Multisig transaction was already executed
    #[error("Multisig transaction {tx_id} has already been executed")]
    MultisigTxAlreadyExecuted { tx_id: String },

    // ========================================================================
    // Not found
    // ========================================================================

    /// Escrow not found
    #[error("Escrow {escrow_id} not found")]
    EscrowNotFound { escrow_id: String },

    /// Proposal not found
    #[error("Proposal {proposal_id} not found")]
    ProposalNotFound { proposal_id: String },

    /// Staking position not found
    #[error("No staking position for {staker}")]
    PositionNotFound { staker: String },

    /// Reputation record not found
    #[error("No reputation record for {subject}")]
    ReputationNotFound { subject: String },

    /// Active role assignment not found
    #[error("{address} does not hold role {role}")]
    RoleNotFound { address: String, role: String },

    /// Escrow has no dispute
    #[error("Escrow {escrow_id} has no dispute")]
    DisputeNotFound { escrow_id: String },

    /// Multisig wallet not found
    #[error("Multisig wallet {address} not found")]
    MultisigNotFound { address: String },

    /// Multisig transaction not found
    #[error("Multisig transaction {tx_id} not found")]
    MultisigTxNotFound { tx_id: String },

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Caller is not allowed to perform this action on the record
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Caller lacks a governance permission
    #[error("{address} lacks permission {permission}")]
    MissingPermission { address: String, permission: String },

    /// Caller tried to revoke their own role
    #[error("{address} cannot revoke their own role")]
    CannotRevokeOwnRole { address: String },

    // ========================================================================
    // Preconditions
    // ========================================================================

    /// Lock period has not elapsed
    #[error("Stake is locked until {unlocks_at}")]
    LockPeriodActive { unlocks_at: String },

    /// Nothing to claim
    #[error("No rewards to claim")]
    NoRewardsToClaim,

    /// Quorum not met at execution
    #[error("Quorum not reached: {total_votes} of {required} required")]
    QuorumNotReached { total_votes: u64, required: u64 },

    /// Approval not met at execution
    #[error("Proposal not approved: approval rate {approval_rate}%")]
    ProposalNotApproved { approval_rate: String },

    /// Proposal has not passed
    #[error("Proposal {proposal_id} has not passed (status: {status})")]
    ProposalNotPassed { proposal_id: String, status: String },

    /// Not enough multisig approvals
    #[error("Multisig transaction {tx_id} has {approvals} of {threshold} approvals")]
    ThresholdNotMet {
        tx_id: String,
        approvals: usize,
        threshold: usize,
    },

    /// Treasury cannot cover a transfer
    #[error("Treasury holds {available} base units, transfer needs {requested}")]
    InsufficientTreasury { available: u64, requested: u64 },

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// External capability failure
    #[error("Capability failure: {message}")]
    Capability { message: String, retriable: bool },

    /// Record could not be (de)serialized
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl GhostSpeakError {
    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Classify the failure
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. }
            | Self::AmountOverflow
            | Self::UnknownToken { .. }
            | Self::StakeBelowMinimum { .. }
            | Self::AmountBelowMinimum { .. }
            | Self::InvalidVotingPeriod { .. }
            | Self::InvalidMultisig { .. } => ErrorCategory::Validation,

            Self::AlreadyStaked { .. }
            | Self::AlreadyUnstaked { .. }
            | Self::InvalidEscrowTransition { .. }
            | Self::DisputeAlreadyExists { .. }
            | Self::DisputeNotOpen { .. }
            | Self::VotingClosed { .. }
            | Self::VotingNotStarted { .. }
            | Self::AlreadyVoted { .. }
            | Self::InvalidProposalTransition { .. }
            | Self::VotingStillOpen { .. }
            | Self::RoleAlreadyAssigned { .. }
            | Self::AlreadyApproved { .. }
            | Self::MultisigTxAlreadyExecuted { .. } => ErrorCategory::StateConflict,

            Self::EscrowNotFound { .. }
            | Self::ProposalNotFound { .. }
            | Self::PositionNotFound { .. }
            | Self::ReputationNotFound { .. }
            | Self::RoleNotFound { .. }
            | Self::DisputeNotFound { .. }
            | Self::MultisigNotFound { .. }
            | Self::MultisigTxNotFound { .. } => ErrorCategory::NotFound,

            Self::Unauthorized { .. }
            | Self::MissingPermission { .. }
            | Self::CannotRevokeOwnRole { .. } => ErrorCategory::Authorization,

            Self::LockPeriodActive { .. }
            | Self::NoRewardsToClaim
            | Self::QuorumNotReached { .. }
            | Self::ProposalNotApproved { .. }
            | Self::ProposalNotPassed { .. }
            | Self::ThresholdNotMet { .. }
            | Self::InsufficientTreasury { .. } => ErrorCategory::PreconditionUnmet,

            Self::Capability { .. } | Self::Serialization { .. } => ErrorCategory::Capability,
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Capability { retriable: true, .. })
    }

    /// Get an error code for presentation layers
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::UnknownToken { .. } => "UNKNOWN_TOKEN",
            Self::StakeBelowMinimum { .. } => "STAKE_BELOW_MINIMUM",
            Self::AmountBelowMinimum { .. } => "AMOUNT_BELOW_MINIMUM",
            Self::InvalidVotingPeriod { .. } => "INVALID_VOTING_PERIOD",
            Self::InvalidMultisig { .. } => "INVALID_MULTISIG",
            Self::AlreadyStaked { .. } => "ALREADY_STAKED",
            Self::AlreadyUnstaked { .. } => "ALREADY_UNSTAKED",
            Self::InvalidEscrowTransition { .. } => "INVALID_ESCROW_TRANSITION",
            Self::DisputeAlreadyExists { .. } => "DISPUTE_ALREADY_EXISTS",
            Self::DisputeNotOpen { .. } => "DISPUTE_NOT_OPEN",
            Self::VotingClosed { .. } => "VOTING_CLOSED",
            Self::VotingNotStarted { .. } => "VOTING_NOT_STARTED",
            Self::AlreadyVoted { .. } => "ALREADY_VOTED",
            Self::InvalidProposalTransition { .. } => "INVALID_PROPOSAL_TRANSITION",
            Self::VotingStillOpen { .. } => "VOTING_STILL_OPEN",
            Self::RoleAlreadyAssigned { .. } => "ROLE_ALREADY_ASSIGNED",
            Self::AlreadyApproved { .. } => "ALREADY_APPROVED",
            Self::MultisigTxAlreadyExecuted { .. } => "MULTISIG_TX_ALREADY_EXECUTED",
            Self::EscrowNotFound { .. } => "ESCROW_NOT_FOUND",
            Self::ProposalNotFound { .. } => "PROPOSAL_NOT_FOUND",
            Self::PositionNotFound { .. } => "POSITION_NOT_FOUND",
            Self::ReputationNotFound { .. } => "REPUTATION_NOT_FOUND",
            Self::RoleNotFound { .. } => "ROLE_NOT_FOUND",
            Self::DisputeNotFound { .. } => "DISPUTE_NOT_FOUND",
            Self::MultisigNotFound { .. } => "MULTISIG_NOT_FOUND",
            Self::MultisigTxNotFound { .. } => "MULTISIG_TX_NOT_FOUND",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::MissingPermission { .. } => "MISSING_PERMISSION",
            Self::CannotRevokeOwnRole { .. } => "CANNOT_REVOKE_OWN_ROLE",
            Self::LockPeriodActive { .. } => "LOCK_PERIOD_ACTIVE",
            Self::NoRewardsToClaim => "NO_REWARDS_TO_CLAIM",
            Self::QuorumNotReached { .. } => "QUORUM_NOT_REACHED",
            Self::ProposalNotApproved { .. } => "PROPOSAL_NOT_APPROVED",
            Self::ProposalNotPassed { .. } => "PROPOSAL_NOT_PASSED",
            Self::ThresholdNotMet { .. } => "THRESHOLD_NOT_MET",
            Self::InsufficientTreasury { .. } => "INSUFFICIENT_TREASURY",
            Self::Capability { .. } => "CAPABILITY_FAILURE",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for GhostSpeakError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = GhostSpeakError::StakeBelowMinimum {
            minimum: 1_000,
            provided: 10,
        };
        assert_eq!(err.error_code(), "STAKE_BELOW_MINIMUM");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_taxonomy() {
        assert_eq!(
            GhostSpeakError::AlreadyVoted {
                proposal_id: "p".into(),
                voter: "v".into()
            }
            .category(),
            ErrorCategory::StateConflict
        );
        assert_eq!(
            GhostSpeakError::CannotRevokeOwnRole { address: "a".into() }.category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            GhostSpeakError::NoRewardsToClaim.category(),
            ErrorCategory::PreconditionUnmet
        );
        assert_eq!(
            GhostSpeakError::EscrowNotFound { escrow_id: "e".into() }.category(),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn test_retriable_errors() {
        let timeout = GhostSpeakError::Capability {
            message: "ledger timeout".into(),
            retriable: true,
        };
        assert!(timeout.is_retriable());
        assert!(!GhostSpeakError::NoRewardsToClaim.is_retriable());
    }
}
