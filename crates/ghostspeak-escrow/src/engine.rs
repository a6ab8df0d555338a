//! Escrow engine
//!
//! Every operation takes the current escrow and a [`CallContext`] and returns
//! the next escrow. On error the input is untouched.
//!
//! | Operation         | Caller             | From                   | To          |
//! |-------------------|--------------------|------------------------|-------------|
//! | `create`          | client             | -                      | created     |
//! | `fund`            | client             | created                | funded      |
//! | `start_work`      | agent              | funded                 | in_progress |
//! | `mark_completed`  | agent              | funded, in_progress    | completed   |
//! | `release`         | client             | completed (no dispute) | released    |
//! | `cancel`          | client             | created, funded        | cancelled   |
//! | `dispute`         | client or agent    | funded, completed      | disputed    |
//! | `resolve_dispute` | mediator / arbiter | disputed               | completed   |

use ghostspeak_types::{
    Address, CallContext, DisputeId, EscrowConfig, EscrowId, GhostSpeakError, Result, TokenTable,
};
use tracing::{debug, info, warn};

use crate::escrow::{
    CreateEscrowRequest, Dispute, DisputeRequest, DisputeStatus, Escrow, EscrowStatus, Resolution,
    Settlement,
};

/// Escrow engine
#[derive(Debug, Clone, Default)]
pub struct EscrowEngine {
    config: EscrowConfig,
    tokens: TokenTable,
}

impl EscrowEngine {
    pub fn new(config: EscrowConfig, tokens: TokenTable) -> Self {
        Self { config, tokens }
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    /// Create an escrow with `ctx.caller` as client
    pub fn create(&self, request: &CreateEscrowRequest, ctx: &CallContext) -> Result<Escrow> {
        let description = request.description.trim();
        if description.is_empty() {
            return Err(GhostSpeakError::invalid_input("description", "must not be empty"));
        }
        if description.chars().count() > self.config.max_description_len {
            return Err(GhostSpeakError::invalid_input(
                "description",
                format!("must be at most {} characters", self.config.max_description_len),
            ));
        }
        if request.amount < self.config.min_amount_units {
            return Err(GhostSpeakError::AmountBelowMinimum {
                minimum: self.config.min_amount_units,
                provided: request.amount,
            });
        }
        if let Some(deadline) = request.deadline {
            if deadline <= ctx.now {
                return Err(GhostSpeakError::invalid_input("deadline", "must be in the future"));
            }
        }
        if request.agent == ctx.caller {
            return Err(GhostSpeakError::invalid_input(
                "agent",
                "client and agent must be different addresses",
            ));
        }
        if let Some(mediator) = &request.mediator {
            if mediator == &ctx.caller || mediator == &request.agent {
                return Err(GhostSpeakError::invalid_input(
                    "mediator",
                    "must not be a party to the escrow",
                ));
            }
        }
        self.ensure_resolvable(request.mediator.as_ref())?;
        let token = self.tokens.get(request.token)?.clone();

        let escrow = Escrow {
            id: EscrowId::new(),
            client: ctx.caller.clone(),
            agent: request.agent.clone(),
            mediator: request.mediator.clone(),
            amount: request.amount,
            token,
            description: description.to_string(),
            job_id: request.job_id.clone(),
            deadline: request.deadline,
            status: EscrowStatus::Created,
            dispute: None,
            created_at: ctx.now,
            funded_at: None,
            started_at: None,
            completed_at: None,
            released_at: None,
            cancelled_at: None,
        };

        info!(
            escrow_id = %escrow.id,
            client = %escrow.client,
            agent = %escrow.agent,
            amount = escrow.amount,
            token = %escrow.token.kind,
            "escrow created"
        );
        Ok(escrow)
    }

    /// created -> funded
    pub fn fund(&self, escrow: &Escrow, ctx: &CallContext) -> Result<Escrow> {
        ensure_client(escrow, ctx, "fund")?;
        if escrow.status != EscrowStatus::Created {
            return Err(transition_error(escrow, "fund"));
        }
        let mut next = escrow.clone();
        next.status = EscrowStatus::Funded;
        next.funded_at = Some(ctx.now);
        log_transition(escrow, &next);
        Ok(next)
    }

    /// funded -> in_progress
    pub fn start_work(&self, escrow: &Escrow, ctx: &CallContext) -> Result<Escrow> {
        ensure_agent(escrow, ctx, "start work on")?;
        if escrow.status != EscrowStatus::Funded {
            return Err(transition_error(escrow, "start work"));
        }
        let mut next = escrow.clone();
        next.status = EscrowStatus::InProgress;
        next.started_at = Some(ctx.now);
        log_transition(escrow, &next);
        Ok(next)
    }

    /// funded | in_progress -> completed
    pub fn mark_completed(&self, escrow: &Escrow, ctx: &CallContext) -> Result<Escrow> {
        ensure_agent(escrow, ctx, "complete")?;
        if !matches!(escrow.status, EscrowStatus::Funded | EscrowStatus::InProgress) {
            return Err(transition_error(escrow, "complete"));
        }
        let mut next = escrow.clone();
        next.status = EscrowStatus::Completed;
        next.completed_at = Some(ctx.now);
        log_transition(escrow, &next);
        Ok(next)
    }

    /// completed -> released
    pub fn release(&self, escrow: &Escrow, ctx: &CallContext) -> Result<Escrow> {
        ensure_client(escrow, ctx, "release")?;
        if !escrow.can_release() {
            return Err(transition_error(escrow, "release"));
        }
        let mut next = escrow.clone();
        next.status = EscrowStatus::Released;
        next.released_at = Some(ctx.now);
        log_transition(escrow, &next);
        Ok(next)
    }

    /// created | funded -> cancelled; the held amount is refunded in full
    pub fn cancel(&self, escrow: &Escrow, ctx: &CallContext) -> Result<Escrow> {
        ensure_client(escrow, ctx, "cancel")?;
        if !escrow.can_cancel() {
            return Err(transition_error(escrow, "cancel"));
        }
        let mut next = escrow.clone();
        next.status = EscrowStatus::Cancelled;
        next.cancelled_at = Some(ctx.now);
        log_transition(escrow, &next);
        Ok(next)
    }

    /// Open a dispute; either party may raise one
    pub fn dispute(
        &self,
        escrow: &Escrow,
        request: &DisputeRequest,
        ctx: &CallContext,
    ) -> Result<Escrow> {
        if !escrow.is_party(&ctx.caller) {
            return Err(GhostSpeakError::unauthorized(format!(
                "{} is not a party to escrow {}",
                ctx.caller, escrow.id
            )));
        }
        if request.reason.trim().is_empty() {
            return Err(GhostSpeakError::invalid_input("reason", "must not be empty"));
        }
        self.validate_evidence(0, &request.evidence)?;
        self.ensure_resolvable(escrow.mediator.as_ref())?;
        if escrow.dispute.is_some() {
            return Err(GhostSpeakError::DisputeAlreadyExists {
                escrow_id: escrow.id.to_string(),
            });
        }
        if !escrow.can_dispute() {
            return Err(transition_error(escrow, "dispute"));
        }

        let mut next = escrow.clone();
        next.status = EscrowStatus::Disputed;
        next.dispute = Some(Dispute {
            id: DisputeId::new(),
            initiator: ctx.caller.clone(),
            reason: request.reason.trim().to_string(),
            evidence: request.evidence.clone(),
            status: DisputeStatus::Open,
            resolution: None,
            client_amount: 0,
            agent_amount: 0,
            resolved_by: None,
            raised_at: ctx.now,
            resolved_at: None,
        });

        warn!(escrow_id = %next.id, initiator = %ctx.caller, "dispute opened");
        log_transition(escrow, &next);
        Ok(next)
    }

    /// Append evidence to an open dispute
    pub fn submit_evidence(
        &self,
        escrow: &Escrow,
        evidence: &[String],
        ctx: &CallContext,
    ) -> Result<Escrow> {
        if !escrow.is_party(&ctx.caller) {
            return Err(GhostSpeakError::unauthorized(format!(
                "{} is not a party to escrow {}",
                ctx.caller, escrow.id
            )));
        }
        let dispute = open_dispute(escrow)?;
        self.validate_evidence(dispute.evidence.len(), evidence)?;

        let mut next = escrow.clone();
        if let Some(dispute) = next.dispute.as_mut() {
            dispute.evidence.extend(evidence.iter().cloned());
        }
        debug!(escrow_id = %next.id, added = evidence.len(), "evidence submitted");
        Ok(next)
    }

    /// disputed -> completed, apportioning the held amount
    pub fn resolve_dispute(
        &self,
        escrow: &Escrow,
        resolution: Resolution,
        ctx: &CallContext,
    ) -> Result<Escrow> {
        if escrow.is_party(&ctx.caller) {
            return Err(GhostSpeakError::unauthorized(
                "parties cannot resolve their own dispute",
            ));
        }
        if !self.may_resolve(escrow, &ctx.caller) {
            return Err(GhostSpeakError::unauthorized(format!(
                "{} is neither the mediator nor an arbiter",
                ctx.caller
            )));
        }
        open_dispute(escrow)?;
        if escrow.status != EscrowStatus::Disputed {
            return Err(transition_error(escrow, "resolve dispute"));
        }

        let (client_amount, agent_amount) = resolution.apportion(escrow.amount);
        let mut next = escrow.clone();
        next.status = EscrowStatus::Completed;
        next.completed_at = Some(ctx.now);
        if let Some(dispute) = next.dispute.as_mut() {
            dispute.status = DisputeStatus::Resolved;
            dispute.resolution = Some(resolution);
            dispute.client_amount = client_amount;
            dispute.agent_amount = agent_amount;
            dispute.resolved_by = Some(ctx.caller.clone());
            dispute.resolved_at = Some(ctx.now);
        }

        info!(
            escrow_id = %next.id,
            resolution = %resolution,
            client_amount,
            agent_amount,
            "dispute resolved"
        );
        log_transition(escrow, &next);
        Ok(next)
    }

    /// Final payout, once the escrow is settled
    ///
    /// Released pays the agent, cancelled refunds the client, and a resolved
    /// dispute pays its recorded split. Anything else has no settlement yet.
    pub fn settlement(&self, escrow: &Escrow) -> Option<Settlement> {
        match (escrow.status, &escrow.dispute) {
            (EscrowStatus::Released, _) => Some(Settlement {
                client_amount: 0,
                agent_amount: escrow.amount,
            }),
            (EscrowStatus::Cancelled, _) => Some(Settlement {
                client_amount: escrow.amount,
                agent_amount: 0,
            }),
            (EscrowStatus::Completed, Some(dispute)) if dispute.status == DisputeStatus::Resolved => {
                Some(Settlement {
                    client_amount: dispute.client_amount,
                    agent_amount: dispute.agent_amount,
                })
            }
            _ => None,
        }
    }

    fn may_resolve(&self, escrow: &Escrow, caller: &Address) -> bool {
        escrow.mediator.as_ref() == Some(caller) || self.config.arbiters.contains(caller)
    }

    /// A dispute needs someone who can resolve it: the mediator or an arbiter
    fn ensure_resolvable(&self, mediator: Option<&Address>) -> Result<()> {
        if mediator.is_none() && self.config.arbiters.is_empty() {
            return Err(GhostSpeakError::invalid_input(
                "mediator",
                "required when no platform arbiters are configured",
            ));
        }
        Ok(())
    }

    fn validate_evidence(&self, existing: usize, evidence: &[String]) -> Result<()> {
        if existing + evidence.len() > self.config.max_evidence {
            return Err(GhostSpeakError::invalid_input(
                "evidence",
                format!("at most {} references per dispute", self.config.max_evidence),
            ));
        }
        for item in evidence {
            if item.trim().is_empty() {
                return Err(GhostSpeakError::invalid_input("evidence", "references must not be empty"));
            }
            if item.chars().count() > self.config.max_evidence_len {
                return Err(GhostSpeakError::invalid_input(
                    "evidence",
                    format!("references must be at most {} characters", self.config.max_evidence_len),
                ));
            }
        }
        Ok(())
    }
}

fn ensure_client(escrow: &Escrow, ctx: &CallContext, action: &str) -> Result<()> {
    if escrow.client != ctx.caller {
        debug!(escrow_id = %escrow.id, caller = %ctx.caller, action, "caller is not the client");
        return Err(GhostSpeakError::unauthorized(format!(
            "only the client may {} escrow {}",
            action, escrow.id
        )));
    }
    Ok(())
}

fn ensure_agent(escrow: &Escrow, ctx: &CallContext, action: &str) -> Result<()> {
    if escrow.agent != ctx.caller {
        debug!(escrow_id = %escrow.id, caller = %ctx.caller, action, "caller is not the agent");
        return Err(GhostSpeakError::unauthorized(format!(
            "only the agent may {} escrow {}",
            action, escrow.id
        )));
    }
    Ok(())
}

fn open_dispute(escrow: &Escrow) -> Result<&Dispute> {
    match &escrow.dispute {
        None => Err(GhostSpeakError::DisputeNotFound {
            escrow_id: escrow.id.to_string(),
        }),
        Some(dispute) if !dispute.is_open() => Err(GhostSpeakError::DisputeNotOpen {
            escrow_id: escrow.id.to_string(),
        }),
        Some(dispute) => Ok(dispute),
    }
}

fn transition_error(escrow: &Escrow, action: &str) -> GhostSpeakError {
    debug!(escrow_id = %escrow.id, status = %escrow.status, action, "illegal escrow transition");
    GhostSpeakError::InvalidEscrowTransition {
        escrow_id: escrow.id.to_string(),
        status: escrow.status.to_string(),
        action: action.to_string(),
    }
}

fn log_transition(from: &Escrow, to: &Escrow) {
    info!(escrow_id = %to.id, from = %from.status, to = %to.status, "escrow transition");
}
