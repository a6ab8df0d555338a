//! Proposals, votes and tallies

use chrono::{DateTime, Utc};
use ghostspeak_types::{Address, ProposalId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    ParameterChange,
    TreasurySpend,
    ProtocolUpgrade,
    Emergency,
    General,
}

/// Proposal lifecycle
///
/// `active -> passed -> executed`, `active -> failed`, `active -> canceled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Active,
    Passed,
    Failed,
    Executed,
    #[serde(rename = "canceled", alias = "cancelled")]
    Cancelled,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Executed => "executed",
            Self::Cancelled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

/// Weighted vote totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub for_votes: u64,
    pub against_votes: u64,
    pub abstain_votes: u64,
}

impl VoteTally {
    pub fn total(&self) -> u64 {
        self.for_votes
            .saturating_add(self.against_votes)
            .saturating_add(self.abstain_votes)
    }

    /// `for / (for + against) * 100`; `None` when nobody voted for or against
    pub fn approval_rate(&self) -> Option<Decimal> {
        if self.for_votes == 0 && self.against_votes == 0 {
            return None;
        }
        let decisive = Decimal::from(self.for_votes) + Decimal::from(self.against_votes);
        Some(Decimal::from(self.for_votes) * Decimal::from(100) / decisive)
    }

    /// `total / quorum * 100`, uncapped
    pub fn quorum_progress(&self, quorum: u64) -> Decimal {
        if quorum == 0 {
            return Decimal::from(100);
        }
        Decimal::from(self.total()) * Decimal::from(100) / Decimal::from(quorum)
    }

    pub fn has_quorum(&self, quorum: u64) -> bool {
        self.total() >= quorum
    }

    /// Strict majority of decisive weight
    pub fn is_approved(&self) -> bool {
        self.approval_rate()
            .map_or(false, |rate| rate > Decimal::from(50))
    }

    pub(crate) fn add(&mut self, choice: VoteChoice, weight: u64) -> Option<()> {
        let slot = match choice {
            VoteChoice::For => &mut self.for_votes,
            VoteChoice::Against => &mut self.against_votes,
            VoteChoice::Abstain => &mut self.abstain_votes,
        };
        *slot = slot.checked_add(weight)?;
        Some(())
    }
}

/// A governance proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: Address,
    pub proposal_type: ProposalType,
    pub title: String,
    pub description: String,
    pub voting_starts_at: DateTime<Utc>,
    pub voting_ends_at: DateTime<Utc>,
    pub tally: VoteTally,
    /// Absolute vote weight required
    pub quorum_required: u64,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn total_votes(&self) -> u64 {
        self.tally.total()
    }

    pub fn quorum_progress(&self) -> Decimal {
        self.tally.quorum_progress(self.quorum_required)
    }

    pub fn approval_rate(&self) -> Option<Decimal> {
        self.tally.approval_rate()
    }

    pub fn has_quorum(&self) -> bool {
        self.tally.has_quorum(self.quorum_required)
    }

    pub fn is_approved(&self) -> bool {
        self.tally.is_approved()
    }

    /// Active and `now` inside `[voting_starts_at, voting_ends_at]`
    pub fn is_voting_open(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Active
            && now >= self.voting_starts_at
            && now <= self.voting_ends_at
    }
}

/// One voter's vote; at most one per (proposal, voter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub voter: Address,
    pub choice: VoteChoice,
    pub weight: u64,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProposalRequest {
    pub proposal_type: ProposalType,
    pub title: String,
    pub description: String,
    pub voting_period_secs: i64,
    /// Falls back to the configured default quorum
    #[serde(default)]
    pub quorum: Option<u64>,
}

/// A vote as submitted by the caller
///
/// `weight` comes from the voter's token holdings, read by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub choice: VoteChoice,
    pub weight: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tally_metrics() {
        let tally = VoteTally {
            for_votes: 600,
            against_votes: 400,
            abstain_votes: 0,
        };
        assert_eq!(tally.total(), 1_000);
        assert!(tally.has_quorum(500));
        assert_eq!(tally.approval_rate(), Some(dec!(60)));
        assert!(tally.is_approved());
        assert_eq!(tally.quorum_progress(500), dec!(200));
    }

    #[test]
    fn test_abstain_excluded_from_approval() {
        let tally = VoteTally {
            for_votes: 0,
            against_votes: 0,
            abstain_votes: 900,
        };
        assert_eq!(tally.approval_rate(), None);
        assert!(!tally.is_approved());
        assert!(tally.has_quorum(900));
    }

    #[test]
    fn test_exact_half_is_not_approved() {
        let tally = VoteTally {
            for_votes: 500,
            against_votes: 500,
            abstain_votes: 10,
        };
        assert_eq!(tally.approval_rate(), Some(dec!(50)));
        assert!(!tally.is_approved());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&ProposalStatus::Cancelled).unwrap(), "\"canceled\"");
        assert_eq!(ProposalStatus::Cancelled.to_string(), "canceled");
        assert_eq!(serde_json::to_string(&ProposalStatus::Active).unwrap(), "\"active\"");
        let legacy: ProposalStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(legacy, ProposalStatus::Cancelled);
    }
}
