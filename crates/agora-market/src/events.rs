//! Typed event log. Every state transition and parameter change appends one
//! event, which is what off-chain indexers consume; tracing output is for
//! operators, this log is for machines.

use crate::types::{DisputeOutcome, SettlementOutcome};
use agora_types::{AccountAddress, AgiAmount};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    JobCreated {
        job_id: u64,
        employer: AccountAddress,
        payout: AgiAmount,
        timestamp: i64,
    },
    JobAssigned {
        job_id: u64,
        agent: AccountAddress,
        payout_pct: u8,
        agent_bond: AgiAmount,
        timestamp: i64,
    },
    CompletionRequested {
        job_id: u64,
        timestamp: i64,
    },
    VoteCast {
        job_id: u64,
        validator: AccountAddress,
        approve: bool,
        bond: AgiAmount,
        timestamp: i64,
    },
    JobDisputed {
        job_id: u64,
        dispute_bond: AgiAmount,
        timestamp: i64,
    },
    DisputeResolved {
        job_id: u64,
        outcome: DisputeOutcome,
        timestamp: i64,
    },
    StaleDisputeResolved {
        job_id: u64,
        timestamp: i64,
    },
    JobExpired {
        job_id: u64,
        slashed_to_employer: AgiAmount,
        timestamp: i64,
    },
    JobCancelled {
        job_id: u64,
        refund: AgiAmount,
        timestamp: i64,
    },
    JobSettled {
        job_id: u64,
        outcome: SettlementOutcome,
        agent_paid: AgiAmount,
        employer_refund: AgiAmount,
        surplus: AgiAmount,
        timestamp: i64,
    },
    ConfigUpdated {
        timestamp: i64,
    },
    IdentityOracleReplaced {
        timestamp: i64,
    },
    BlacklistUpdated {
        account: AccountAddress,
        banned: bool,
        timestamp: i64,
    },
    PauseChanged {
        intake_paused: bool,
        settlement_paused: bool,
        timestamp: i64,
    },
    SurplusWithdrawn {
        amount: AgiAmount,
        timestamp: i64,
    },
    /// Diagnostic record of a failed best-effort external call; the core
    /// transition it accompanied still committed.
    ExternalCallFailed {
        job_id: u64,
        detail: String,
        timestamp: i64,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Option<u64> {
        match self {
            JobEvent::JobCreated { job_id, .. }
            | JobEvent::JobAssigned { job_id, .. }
            | JobEvent::CompletionRequested { job_id, .. }
            | JobEvent::VoteCast { job_id, .. }
            | JobEvent::JobDisputed { job_id, .. }
            | JobEvent::DisputeResolved { job_id, .. }
            | JobEvent::StaleDisputeResolved { job_id, .. }
            | JobEvent::JobExpired { job_id, .. }
            | JobEvent::JobCancelled { job_id, .. }
            | JobEvent::JobSettled { job_id, .. }
            | JobEvent::ExternalCallFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}

/// Append-only in-process event log.
pub struct EventLog {
    events: Arc<RwLock<Vec<JobEvent>>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn emit(&self, event: JobEvent) {
        self.events.write().await.push(event);
    }

    pub async fn all(&self) -> Vec<JobEvent> {
        self.events.read().await.clone()
    }

    pub async fn for_job(&self, job_id: u64) -> Vec<JobEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.job_id() == Some(job_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}
