use agora_types::{AccountAddress, AgiAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound on the free-text `details` field of a job, in bytes.
pub const MAX_DETAILS_LEN: usize = 4096;

/// Hard cap on any stored reputation score.
pub const MAX_REPUTATION: u64 = 1_000_000;

/// Job lifecycle states. Exactly one holds at any time; `Disputed` is only
/// reachable after a completion request and before any terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Open,
    Assigned,
    CompletionRequested,
    Disputed,
    SettledAgentWin,
    SettledEmployerWin,
    Expired,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::SettledAgentWin
                | JobStatus::SettledEmployerWin
                | JobStatus::Expired
                | JobStatus::Cancelled
        )
    }
}

/// A validator's ballot on a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    Approve,
    Disapprove,
}

/// Per-validator vote record. The bond is snapshotted at vote time and is
/// immutable thereafter, even if bond parameters change later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub choice: VoteChoice,
    pub bond: AgiAmount,
    pub cast_at: i64,
}

/// Moderator ruling on a disputed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeOutcome {
    /// Keep the job disputable: voting reopens, no funds move.
    NoAction,
    /// Pay the agent their tier share, mint the completion certificate.
    AgentWin,
    /// Refund the employer.
    EmployerWin,
}

impl DisputeOutcome {
    /// Numeric codes accepted by `resolve_dispute_with_code`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DisputeOutcome::NoAction),
            1 => Some(DisputeOutcome::AgentWin),
            2 => Some(DisputeOutcome::EmployerWin),
            _ => None,
        }
    }
}

/// Terminal economic outcome of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    AgentWin,
    EmployerWin,
}

/// One posted task: identity, escrowed economics, lifecycle timestamps,
/// content URIs, and the vote tallies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: u64,
    pub employer: AccountAddress,
    pub assigned_agent: Option<AccountAddress>,

    /// Escrowed amount, locked at creation.
    pub payout: AgiAmount,
    /// Payout percentage snapshotted from the tier resolver at assignment.
    pub agent_payout_pct: u8,
    /// Agent bond snapshotted at assignment.
    pub agent_bond: AgiAmount,
    /// Dispute bond posted by the employer, zero unless disputed.
    pub dispute_bond: AgiAmount,
    /// Deadline window from assignment, in seconds.
    pub duration: i64,

    pub created_at: i64,
    pub assigned_at: Option<i64>,
    pub completion_requested_at: Option<i64>,
    pub disputed_at: Option<i64>,
    /// Set when the approval quorum is reached and a post-approval
    /// challenge window is configured.
    pub approval_quorum_at: Option<i64>,

    pub job_spec_uri: String,
    pub job_completion_uri: Option<String>,
    pub details: String,

    pub approvals: u32,
    pub disapprovals: u32,
    /// One record per validator; checked before insert, never scanned.
    pub votes: HashMap<AccountAddress, VoteRecord>,

    pub status: JobStatus,
}

impl Job {
    /// Completion deadline, defined once the job is assigned.
    pub fn deadline(&self) -> Option<i64> {
        self.assigned_at.map(|t| t + self.duration)
    }

    /// End of the validator review window, defined once completion is
    /// requested.
    pub fn review_deadline(&self, review_period: i64) -> Option<i64> {
        self.completion_requested_at.map(|t| t + review_period)
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            JobStatus::SettledAgentWin | JobStatus::SettledEmployerWin
        )
    }

    pub fn vote_count(&self) -> u32 {
        self.approvals + self.disapprovals
    }
}
