//! Escrow and dispute records

use chrono::{DateTime, Utc};
use ghostspeak_types::{Address, DisputeId, EscrowId, TokenInfo, TokenKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Escrow lifecycle
///
/// ```text
/// created -> funded -> in_progress -> completed -> released
///              |                         |
///              +------> disputed <-------+
/// created | funded -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Created,
    Funded,
    InProgress,
    Completed,
    Disputed,
    Released,
    Cancelled,
}

impl EscrowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Cancelled)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscrowStatus::Created => "created",
            EscrowStatus::Funded => "funded",
            EscrowStatus::InProgress => "in_progress",
            EscrowStatus::Completed => "completed",
            EscrowStatus::Disputed => "disputed",
            EscrowStatus::Released => "released",
            EscrowStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// Outcome of a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Full amount back to the client
    FavorClient,
    /// Full amount to the agent
    FavorAgent,
    /// Halves; an odd remainder unit goes to the client
    Split,
}

impl Resolution {
    /// (client_amount, agent_amount) for a held amount
    pub fn apportion(&self, amount: u64) -> (u64, u64) {
        match self {
            Resolution::FavorClient => (amount, 0),
            Resolution::FavorAgent => (0, amount),
            Resolution::Split => {
                let agent = amount / 2;
                (amount - agent, agent)
            }
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resolution::FavorClient => "favor_client",
            Resolution::FavorAgent => "favor_agent",
            Resolution::Split => "split",
        };
        f.write_str(s)
    }
}

/// Dispute embedded in an escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub initiator: Address,
    pub reason: String,
    /// Evidence references (URIs or content hashes)
    pub evidence: Vec<String>,
    pub status: DisputeStatus,
    pub resolution: Option<Resolution>,
    /// Base units paid to the client on resolution
    pub client_amount: u64,
    /// Base units paid to the agent on resolution
    pub agent_amount: u64,
    pub resolved_by: Option<Address>,
    pub raised_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn is_open(&self) -> bool {
        self.status == DisputeStatus::Open
    }
}

/// Payment held between a client and an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub client: Address,
    pub agent: Address,
    pub mediator: Option<Address>,
    /// Held amount in base units
    pub amount: u64,
    pub token: TokenInfo,
    pub description: String,
    pub job_id: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: EscrowStatus,
    pub dispute: Option<Dispute>,
    pub created_at: DateTime<Utc>,
    pub funded_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Escrow {
    pub fn is_party(&self, address: &Address) -> bool {
        &self.client == address || &self.agent == address
    }

    /// Completed, with no dispute attached
    pub fn can_release(&self) -> bool {
        self.status == EscrowStatus::Completed && self.dispute.is_none()
    }

    /// Funded or completed, with no dispute attached
    pub fn can_dispute(&self) -> bool {
        matches!(self.status, EscrowStatus::Funded | EscrowStatus::Completed)
            && self.dispute.is_none()
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self.status, EscrowStatus::Created | EscrowStatus::Funded)
    }

    pub fn token_kind(&self) -> TokenKind {
        self.token.kind
    }

    /// Held amount for display, e.g. "2.5 USDC"
    pub fn display_amount(&self) -> String {
        self.token.format(self.amount)
    }
}

/// Parameters for a new escrow; the caller is the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEscrowRequest {
    pub agent: Address,
    pub amount: u64,
    pub token: TokenKind,
    pub description: String,
    #[serde(default)]
    pub mediator: Option<Address>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Parameters for opening a dispute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Final payout of a settled escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub client_amount: u64,
    pub agent_amount: u64,
}
