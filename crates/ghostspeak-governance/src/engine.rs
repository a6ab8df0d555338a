//! Governance engine: proposal lifecycle and voting

use chrono::{DateTime, Duration, Utc};
use ghostspeak_types::{CallContext, GhostSpeakError, GovernanceConfig, ProposalId, Result};
use tracing::{debug, info};

use crate::proposal::{
    CreateProposalRequest, Proposal, ProposalStatus, Vote, VoteRequest, VoteTally,
};
use crate::rbac::{Permission, RoleRegistry};

/// Governance engine
#[derive(Debug, Clone, Default)]
pub struct GovernanceEngine {
    pub(crate) config: GovernanceConfig,
}

impl GovernanceEngine {
    pub fn new(config: GovernanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Open a proposal; the caller needs `create_proposal`
    ///
    /// Voting opens after the configured grace interval and runs for the
    /// requested period.
    pub fn create_proposal(
        &self,
        roles: &RoleRegistry,
        request: &CreateProposalRequest,
        ctx: &CallContext,
    ) -> Result<Proposal> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(GhostSpeakError::invalid_input("title", "must not be empty"));
        }
        if title.chars().count() > self.config.max_title_len {
            return Err(GhostSpeakError::invalid_input(
                "title",
                format!("must be at most {} characters", self.config.max_title_len),
            ));
        }
        if request.description.chars().count() > self.config.max_description_len {
            return Err(GhostSpeakError::invalid_input(
                "description",
                format!("must be at most {} characters", self.config.max_description_len),
            ));
        }
        let period = request.voting_period_secs;
        if period < self.config.min_voting_period_secs || period > self.config.max_voting_period_secs {
            return Err(GhostSpeakError::InvalidVotingPeriod {
                seconds: period,
                min: self.config.min_voting_period_secs,
                max: self.config.max_voting_period_secs,
            });
        }
        let quorum = request.quorum.unwrap_or(self.config.default_quorum);
        if quorum == 0 {
            return Err(GhostSpeakError::invalid_input("quorum", "must be positive"));
        }
        roles.require_permission(&ctx.caller, Permission::CreateProposal, ctx.now)?;

        let voting_starts_at = ctx.now + Duration::seconds(self.config.voting_grace_secs);
        let proposal = Proposal {
            id: ProposalId::new(),
            proposer: ctx.caller.clone(),
            proposal_type: request.proposal_type,
            title: title.to_string(),
            description: request.description.clone(),
            voting_starts_at,
            voting_ends_at: voting_starts_at + Duration::seconds(period),
            tally: VoteTally::default(),
            quorum_required: quorum,
            status: ProposalStatus::Active,
            created_at: ctx.now,
            finalized_at: None,
            executed_at: None,
            cancelled_at: None,
        };

        info!(
            proposal_id = %proposal.id,
            proposer = %proposal.proposer,
            quorum,
            voting_starts_at = %proposal.voting_starts_at,
            voting_ends_at = %proposal.voting_ends_at,
            "proposal created"
        );
        Ok(proposal)
    }

    /// Cast the caller's vote
    ///
    /// `existing_vote` is the caller's recorded vote on this proposal, if any.
    /// A proposal that is no longer `active` is closed to voting.
    pub fn vote(
        &self,
        proposal: &Proposal,
        existing_vote: Option<&Vote>,
        request: &VoteRequest,
        ctx: &CallContext,
    ) -> Result<(Proposal, Vote)> {
        if request.weight == 0 {
            return Err(GhostSpeakError::invalid_input("weight", "must be positive"));
        }
        if proposal.status != ProposalStatus::Active || ctx.now > proposal.voting_ends_at {
            return Err(GhostSpeakError::VotingClosed {
                proposal_id: proposal.id.to_string(),
                ended_at: proposal.voting_ends_at.to_rfc3339(),
            });
        }
        if ctx.now < proposal.voting_starts_at {
            return Err(GhostSpeakError::VotingNotStarted {
                proposal_id: proposal.id.to_string(),
                starts_at: proposal.voting_starts_at.to_rfc3339(),
            });
        }
        if existing_vote.is_some_and(|v| v.proposal_id == proposal.id && v.voter == ctx.caller) {
            debug!(proposal_id = %proposal.id, voter = %ctx.caller, "duplicate vote");
            return Err(GhostSpeakError::AlreadyVoted {
                proposal_id: proposal.id.to_string(),
                voter: ctx.caller.to_string(),
            });
        }

        let mut next = proposal.clone();
        next.tally
            .add(request.choice, request.weight)
            .ok_or(GhostSpeakError::AmountOverflow)?;
        let vote = Vote {
            proposal_id: proposal.id,
            voter: ctx.caller.clone(),
            choice: request.choice,
            weight: request.weight,
            cast_at: ctx.now,
        };

        info!(
            proposal_id = %next.id,
            voter = %vote.voter,
            choice = ?vote.choice,
            weight = vote.weight,
            total = next.total_votes(),
            "vote cast"
        );
        Ok((next, vote))
    }

    /// Close voting: `passed` with quorum and approval, else `failed`
    pub fn finalize(&self, proposal: &Proposal, now: DateTime<Utc>) -> Result<Proposal> {
        if proposal.status != ProposalStatus::Active {
            return Err(proposal_transition_error(proposal, "finalize"));
        }
        if now <= proposal.voting_ends_at {
            return Err(GhostSpeakError::VotingStillOpen {
                proposal_id: proposal.id.to_string(),
                ends_at: proposal.voting_ends_at.to_rfc3339(),
            });
        }

        let mut next = proposal.clone();
        next.status = if proposal.has_quorum() && proposal.is_approved() {
            ProposalStatus::Passed
        } else {
            ProposalStatus::Failed
        };
        next.finalized_at = Some(now);

        info!(
            proposal_id = %next.id,
            status = %next.status,
            total = next.total_votes(),
            quorum = next.quorum_required,
            "proposal finalized"
        );
        Ok(next)
    }

    /// `passed -> executed`
    pub fn execute(&self, proposal: &Proposal, ctx: &CallContext) -> Result<Proposal> {
        if proposal.status != ProposalStatus::Passed {
            return Err(GhostSpeakError::ProposalNotPassed {
                proposal_id: proposal.id.to_string(),
                status: proposal.status.to_string(),
            });
        }
        if !proposal.has_quorum() {
            return Err(GhostSpeakError::QuorumNotReached {
                total_votes: proposal.total_votes(),
                required: proposal.quorum_required,
            });
        }
        if !proposal.is_approved() {
            return Err(GhostSpeakError::ProposalNotApproved {
                approval_rate: proposal
                    .approval_rate()
                    .map(|rate| rate.round_dp(2).to_string())
                    .unwrap_or_else(|| "undefined".to_string()),
            });
        }

        let mut next = proposal.clone();
        next.status = ProposalStatus::Executed;
        next.executed_at = Some(ctx.now);
        info!(proposal_id = %next.id, executor = %ctx.caller, "proposal executed");
        Ok(next)
    }

    /// Cancel an active proposal; proposer or a `cancel_proposal` holder
    pub fn cancel(
        &self,
        roles: &RoleRegistry,
        proposal: &Proposal,
        ctx: &CallContext,
    ) -> Result<Proposal> {
        if proposal.proposer != ctx.caller {
            roles.require_permission(&ctx.caller, Permission::CancelProposal, ctx.now)?;
        }
        if proposal.status != ProposalStatus::Active {
            return Err(proposal_transition_error(proposal, "cancel"));
        }

        let mut next = proposal.clone();
        next.status = ProposalStatus::Cancelled;
        next.cancelled_at = Some(ctx.now);
        info!(proposal_id = %next.id, cancelled_by = %ctx.caller, "proposal cancelled");
        Ok(next)
    }
}

fn proposal_transition_error(proposal: &Proposal, action: &str) -> GhostSpeakError {
    debug!(proposal_id = %proposal.id, status = %proposal.status, action, "illegal proposal transition");
    GhostSpeakError::InvalidProposalTransition {
        proposal_id: proposal.id.to_string(),
        status: proposal.status.to_string(),
        action: action.to_string(),
    }
}
