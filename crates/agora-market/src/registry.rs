//! Job registry and lifecycle state machine.
//!
//! Every externally triggered action validates against current stored state
//! under one write lock and either fully commits or fails with no partial
//! mutation. Timeouts are checked lazily: operations take `now` and compare
//! it against stored deadlines, nothing fires asynchronously.

use crate::bond;
use crate::certificate::{certificate_token_id, CertificateIssuer};
use crate::config::ProtocolConfig;
use crate::error::{MarketError, Result};
use crate::events::{EventLog, JobEvent};
use crate::identity::IdentityOracle;
use crate::reputation::{reputation_delta, ReputationBook};
use crate::settlement::{plan_expiry, plan_settlement, plan_stale_unwind, SettlementPlan};
use crate::tiers::PayoutTierRegistry;
use crate::types::{
    DisputeOutcome, Job, JobStatus, SettlementOutcome, VoteChoice, VoteRecord, MAX_DETAILS_LEN,
};
use agora_ledger::{EscrowLedger, LockClass};
use agora_types::{AccountAddress, AgiAmount, Role};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

struct RegistryState {
    next_job_id: u64,
    jobs: HashMap<u64, Job>,
    active_jobs: HashMap<AccountAddress, u32>,
    blacklist: HashSet<AccountAddress>,
    intake_paused: bool,
    settlement_paused: bool,
}

/// Aggregate registry counters for external tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketStats {
    pub total_jobs: u64,
    pub open: usize,
    pub assigned: usize,
    pub completion_requested: usize,
    pub disputed: usize,
    pub settled_agent_win: usize,
    pub settled_employer_win: usize,
    pub expired: usize,
}

/// The escrow-and-settlement engine.
pub struct JobRegistry {
    owner: AccountAddress,
    config: RwLock<ProtocolConfig>,
    state: RwLock<RegistryState>,
    ledger: Arc<EscrowLedger>,
    tiers: Arc<PayoutTierRegistry>,
    identity: RwLock<Arc<dyn IdentityOracle>>,
    certificates: Arc<dyn CertificateIssuer>,
    reputation: ReputationBook,
    events: EventLog,
}

impl JobRegistry {
    pub fn new(
        owner: AccountAddress,
        config: ProtocolConfig,
        ledger: Arc<EscrowLedger>,
        tiers: Arc<PayoutTierRegistry>,
        identity: Arc<dyn IdentityOracle>,
        certificates: Arc<dyn CertificateIssuer>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            owner,
            config: RwLock::new(config),
            state: RwLock::new(RegistryState {
                next_job_id: 1,
                jobs: HashMap::new(),
                active_jobs: HashMap::new(),
                blacklist: HashSet::new(),
                intake_paused: false,
                settlement_paused: false,
            }),
            ledger,
            tiers,
            identity: RwLock::new(identity),
            certificates,
            reputation: ReputationBook::new(),
            events: EventLog::new(),
        })
    }

    // ========== Job intake and assignment ==========

    /// Post a job and escrow its payout. Returns the new job id.
    pub async fn create_job(
        &self,
        employer: AccountAddress,
        spec_uri: String,
        payout: AgiAmount,
        duration: i64,
        details: String,
        now: i64,
    ) -> Result<u64> {
        let cfg = self.config.read().await.clone();
        let mut state = self.state.write().await;

        if state.intake_paused {
            return Err(MarketError::IntakePaused);
        }
        if details.len() > MAX_DETAILS_LEN {
            return Err(MarketError::InvalidParameters(format!(
                "details exceed {} bytes",
                MAX_DETAILS_LEN
            )));
        }
        if payout.is_zero() {
            return Err(MarketError::InvalidParameters("payout is zero".into()));
        }
        if payout > cfg.max_job_payout {
            return Err(MarketError::InvalidParameters(format!(
                "payout {} exceeds maximum {}",
                payout, cfg.max_job_payout
            )));
        }
        if duration <= 0 || duration > cfg.max_job_duration {
            return Err(MarketError::InvalidParameters(
                "duration out of range".into(),
            ));
        }

        self.ledger.collect(LockClass::Escrow, payout).await?;

        let job_id = state.next_job_id;
        state.next_job_id += 1;
        state.jobs.insert(
            job_id,
            Job {
                job_id,
                employer,
                assigned_agent: None,
                payout,
                agent_payout_pct: 0,
                agent_bond: AgiAmount::ZERO,
                dispute_bond: AgiAmount::ZERO,
                duration,
                created_at: now,
                assigned_at: None,
                completion_requested_at: None,
                disputed_at: None,
                approval_quorum_at: None,
                job_spec_uri: spec_uri,
                job_completion_uri: None,
                details,
                approvals: 0,
                disapprovals: 0,
                votes: HashMap::new(),
                status: JobStatus::Open,
            },
        );

        info!(
            job_id,
            employer = %employer,
            payout = payout.to_agi(),
            "📋 Job created"
        );
        self.events
            .emit(JobEvent::JobCreated {
                job_id,
                employer,
                payout,
                timestamp: now,
            })
            .await;
        Ok(job_id)
    }

    /// Assign the calling agent to an open job: authorization, tier
    /// snapshot, and agent bond, all in one transition.
    pub async fn apply_for_job(
        &self,
        job_id: u64,
        agent: AccountAddress,
        label: &str,
        proof: &[u8],
        now: i64,
    ) -> Result<()> {
        self.check_role(Role::Agent, job_id, agent, label, proof)
            .await?;
        let cfg = self.config.read().await.clone();
        // Read once at the snapshot point; never re-read later.
        let payout_pct = self.tiers.resolve(agent, cfg.default_payout_pct).await;

        let mut state = self.state.write().await;
        let state = &mut *state;
        if state.blacklist.contains(&agent) {
            return Err(MarketError::NotAuthorized(format!(
                "agent {} is blacklisted",
                agent
            )));
        }
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;
        if job.status != JobStatus::Open {
            return Err(MarketError::InvalidState("job is not open".into()));
        }
        let active = state.active_jobs.get(&agent).copied().unwrap_or(0);
        if active >= cfg.max_active_jobs_per_agent {
            return Err(MarketError::InvalidState(format!(
                "agent already has {} active jobs",
                active
            )));
        }
        if payout_pct == 0 {
            return Err(MarketError::IneligibleAgentPayout);
        }

        let agent_bond = bond::agent_bond(
            job.payout,
            job.duration,
            cfg.agent_bond_bps,
            cfg.agent_bond_min,
            cfg.agent_bond_max,
            cfg.agent_duration_limit,
        );
        self.ledger.collect(LockClass::AgentBond, agent_bond).await?;

        job.assigned_agent = Some(agent);
        job.agent_payout_pct = payout_pct;
        job.agent_bond = agent_bond;
        job.assigned_at = Some(now);
        job.status = JobStatus::Assigned;
        *state.active_jobs.entry(agent).or_insert(0) += 1;

        info!(
            job_id,
            agent = %agent,
            payout_pct,
            bond = agent_bond.to_agi(),
            "🤝 Agent assigned"
        );
        self.events
            .emit(JobEvent::JobAssigned {
                job_id,
                agent,
                payout_pct,
                agent_bond,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Agent signals delivery before the deadline.
    pub async fn request_completion(
        &self,
        job_id: u64,
        agent: AccountAddress,
        completion_uri: String,
        now: i64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.settlement_paused {
            return Err(MarketError::SettlementPaused);
        }
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;
        if job.assigned_agent != Some(agent) {
            return Err(MarketError::NotAuthorized(
                "only the assigned agent may request completion".into(),
            ));
        }
        if job.status != JobStatus::Assigned {
            return Err(MarketError::InvalidState(
                "completion already requested or job settled".into(),
            ));
        }
        match job.deadline() {
            Some(deadline) if now <= deadline => {}
            _ => {
                return Err(MarketError::InvalidState(
                    "deadline elapsed; job is expirable".into(),
                ))
            }
        }

        job.completion_requested_at = Some(now);
        job.job_completion_uri = Some(completion_uri);
        job.status = JobStatus::CompletionRequested;

        info!(job_id, agent = %agent, "📦 Completion requested");
        self.events
            .emit(JobEvent::CompletionRequested {
                job_id,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Employer withdraws an unassigned job; escrow is refunded and the
    /// record removed.
    pub async fn cancel_job(&self, job_id: u64, caller: AccountAddress, now: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;
        if job.employer != caller {
            return Err(MarketError::NotAuthorized(
                "only the employer may cancel".into(),
            ));
        }
        self.remove_open_job(&mut state, job_id, now).await
    }

    /// Owner variant of `cancel_job`, for delisting abandoned postings.
    pub async fn delist_job(&self, job_id: u64, caller: AccountAddress, now: i64) -> Result<()> {
        self.require_owner(caller)?;
        let mut state = self.state.write().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(MarketError::NotFound(job_id));
        }
        self.remove_open_job(&mut state, job_id, now).await
    }

    async fn remove_open_job(
        &self,
        state: &mut RegistryState,
        job_id: u64,
        now: i64,
    ) -> Result<()> {
        let job = state
            .jobs
            .get(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;
        if job.status != JobStatus::Open {
            return Err(MarketError::InvalidState(
                "job can only be cancelled before assignment".into(),
            ));
        }
        let refund = job.payout;
        self.ledger.release_to_party(LockClass::Escrow, refund).await?;
        state.jobs.remove(&job_id);

        info!(job_id, refund = refund.to_agi(), "🚫 Job cancelled");
        self.events
            .emit(JobEvent::JobCancelled {
                job_id,
                refund,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Anyone may expire an assigned job whose deadline elapsed with no
    /// completion request: employer refunded, agent bond partially slashed
    /// to the employer.
    pub async fn expire_job(&self, job_id: u64, now: i64) -> Result<()> {
        let cfg = self.config.read().await.clone();
        let mut state = self.state.write().await;
        let state = &mut *state;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;

        match job.status {
            JobStatus::Assigned => {}
            JobStatus::CompletionRequested | JobStatus::Disputed => {
                return Err(MarketError::InvalidState(
                    "completion was requested; use finalize or dispute paths".into(),
                ))
            }
            _ => return Err(MarketError::InvalidState("job is not active".into())),
        }
        match job.deadline() {
            Some(deadline) if now > deadline => {}
            _ => {
                return Err(MarketError::InvalidState(
                    "deadline has not elapsed".into(),
                ))
            }
        }

        let plan = plan_expiry(job, &cfg);
        self.apply_plan(&plan).await?;
        job.status = JobStatus::Expired;
        Self::release_agent_slot(&mut state.active_jobs, job.assigned_agent);

        warn!(
            job_id,
            slashed = plan.agent_bond_to_employer.to_agi(),
            "⏰ Job expired without completion"
        );
        self.events
            .emit(JobEvent::JobExpired {
                job_id,
                slashed_to_employer: plan.agent_bond_to_employer,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    // ========== Validator voting ==========

    /// Cast a validator vote. Posts the validator bond, updates the tally,
    /// and settles or disputes immediately when a quorum is reached.
    pub async fn validate_job(
        &self,
        job_id: u64,
        validator: AccountAddress,
        approve: bool,
        label: &str,
        proof: &[u8],
        now: i64,
    ) -> Result<()> {
        self.check_role(Role::Validator, job_id, validator, label, proof)
            .await?;
        let cfg = self.config.read().await.clone();
        let mut state = self.state.write().await;
        let state = &mut *state;
        if state.settlement_paused {
            return Err(MarketError::SettlementPaused);
        }
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;

        match job.status {
            JobStatus::CompletionRequested => {}
            JobStatus::Disputed => {
                return Err(MarketError::InvalidState(
                    "voting is frozen while disputed".into(),
                ))
            }
            _ => {
                return Err(MarketError::InvalidState(
                    "voting requires a pending completion request".into(),
                ))
            }
        }
        if job.votes.contains_key(&validator) {
            return Err(MarketError::InvalidState(
                "validator has already voted on this job".into(),
            ));
        }

        let vote_bond = bond::validator_bond(
            job.payout,
            cfg.validator_bond_bps,
            cfg.validator_bond_min,
            cfg.validator_bond_max,
        )?;
        self.ledger
            .collect(LockClass::ValidatorBond, vote_bond)
            .await?;

        let choice = if approve {
            job.approvals += 1;
            VoteChoice::Approve
        } else {
            job.disapprovals += 1;
            VoteChoice::Disapprove
        };
        job.votes.insert(
            validator,
            VoteRecord {
                choice,
                bond: vote_bond,
                cast_at: now,
            },
        );

        info!(
            job_id,
            validator = %validator,
            approve,
            bond = vote_bond.to_agi(),
            approvals = job.approvals,
            disapprovals = job.disapprovals,
            "🗳️ Vote cast"
        );
        self.events
            .emit(JobEvent::VoteCast {
                job_id,
                validator,
                approve,
                bond: vote_bond,
                timestamp: now,
            })
            .await;

        // Quorum checks. A disapproval quorum wins over a pending approval
        // quorum that is still inside its challenge window.
        if !approve && job.disapprovals >= cfg.required_disapprovals {
            job.status = JobStatus::Disputed;
            job.disputed_at = Some(now);
            info!(job_id, "⚖️ Disapproval quorum reached, job disputed");
            self.events
                .emit(JobEvent::JobDisputed {
                    job_id,
                    dispute_bond: AgiAmount::ZERO,
                    timestamp: now,
                })
                .await;
        } else if approve
            && job.approvals >= cfg.required_approvals
            && job.approval_quorum_at.is_none()
        {
            if cfg.approval_challenge_window == 0 {
                let plan = plan_settlement(job, &cfg, SettlementOutcome::AgentWin);
                self.settle(job, &mut state.active_jobs, plan, now).await?;
            } else {
                job.approval_quorum_at = Some(now);
                info!(
                    job_id,
                    window = cfg.approval_challenge_window,
                    "⏳ Approval quorum reached, challenge window open"
                );
            }
        }
        Ok(())
    }

    /// Drive a job to settlement once its clock has run: a matured approval
    /// quorum settles agent-win; past the review period the slow path
    /// applies majority rule, escalating ties (and settling the zero-vote
    /// case in the agent's favor with the reward budget rebated).
    pub async fn finalize_job(&self, job_id: u64, now: i64) -> Result<()> {
        let cfg = self.config.read().await.clone();
        let mut state = self.state.write().await;
        let state = &mut *state;
        if state.settlement_paused {
            return Err(MarketError::SettlementPaused);
        }
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;

        match job.status {
            JobStatus::CompletionRequested => {}
            JobStatus::Disputed => {
                return Err(MarketError::InvalidState(
                    "disputed; awaiting a moderator ruling".into(),
                ))
            }
            _ => {
                return Err(MarketError::InvalidState(
                    "nothing to finalize in the current state".into(),
                ))
            }
        }

        if let Some(quorum_at) = job.approval_quorum_at {
            if now < quorum_at + cfg.approval_challenge_window {
                return Err(MarketError::InvalidState(
                    "challenge window still open".into(),
                ));
            }
            let plan = plan_settlement(job, &cfg, SettlementOutcome::AgentWin);
            return self.settle(job, &mut state.active_jobs, plan, now).await;
        }

        let requested_at = job
            .completion_requested_at
            .ok_or_else(|| MarketError::InvalidState("completion not requested".into()))?;
        if now <= requested_at + cfg.review_period {
            return Err(MarketError::InvalidState(
                "review period still open".into(),
            ));
        }

        if job.vote_count() == 0 {
            let plan = plan_settlement(job, &cfg, SettlementOutcome::AgentWin);
            return self.settle(job, &mut state.active_jobs, plan, now).await;
        }
        if job.approvals > job.disapprovals {
            let plan = plan_settlement(job, &cfg, SettlementOutcome::AgentWin);
            return self.settle(job, &mut state.active_jobs, plan, now).await;
        }
        if job.disapprovals > job.approvals {
            let plan = plan_settlement(job, &cfg, SettlementOutcome::EmployerWin);
            return self.settle(job, &mut state.active_jobs, plan, now).await;
        }

        // Tied with votes cast: neither side may be favored, escalate.
        job.status = JobStatus::Disputed;
        job.disputed_at = Some(now);
        info!(job_id, "⚖️ Slow-path tie, job disputed");
        self.events
            .emit(JobEvent::JobDisputed {
                job_id,
                dispute_bond: AgiAmount::ZERO,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    // ========== Disputes ==========

    /// Employer contests a completion request within the review window,
    /// posting a dispute bond.
    pub async fn dispute_job(
        &self,
        job_id: u64,
        employer: AccountAddress,
        now: i64,
    ) -> Result<()> {
        let cfg = self.config.read().await.clone();
        let mut state = self.state.write().await;
        if state.settlement_paused {
            return Err(MarketError::SettlementPaused);
        }
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;
        if job.employer != employer {
            return Err(MarketError::NotAuthorized(
                "only the employer may dispute".into(),
            ));
        }
        match job.status {
            JobStatus::CompletionRequested => {}
            JobStatus::Disputed => {
                return Err(MarketError::InvalidState("already disputed".into()))
            }
            _ => {
                return Err(MarketError::InvalidState(
                    "disputes require a pending completion request".into(),
                ))
            }
        }
        let requested_at = job
            .completion_requested_at
            .ok_or_else(|| MarketError::InvalidState("completion not requested".into()))?;
        if now > requested_at + cfg.review_period {
            return Err(MarketError::InvalidState(
                "review window closed; finalize instead".into(),
            ));
        }

        // A bond retained across a NoAction ruling stays posted; only a
        // first dispute collects one.
        let dispute_bond = if job.dispute_bond.is_zero() {
            let bond = job
                .payout
                .scale_bps(cfg.dispute_bond_bps)
                .clamp_to(cfg.dispute_bond_min, cfg.dispute_bond_max);
            self.ledger.collect(LockClass::DisputeBond, bond).await?;
            bond
        } else {
            job.dispute_bond
        };

        job.dispute_bond = dispute_bond;
        job.status = JobStatus::Disputed;
        job.disputed_at = Some(now);

        info!(
            job_id,
            bond = dispute_bond.to_agi(),
            "⚖️ Employer disputed the job"
        );
        self.events
            .emit(JobEvent::JobDisputed {
                job_id,
                dispute_bond,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Moderator ruling on a disputed job. Works while settlement is
    /// paused: rulings are part of incident recovery.
    pub async fn resolve_dispute(
        &self,
        job_id: u64,
        moderator: AccountAddress,
        outcome: DisputeOutcome,
        now: i64,
    ) -> Result<()> {
        self.check_role(Role::Moderator, job_id, moderator, "", &[])
            .await?;
        let cfg = self.config.read().await.clone();
        let mut state = self.state.write().await;
        let state = &mut *state;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;
        if job.status != JobStatus::Disputed {
            return Err(MarketError::InvalidState("job is not disputed".into()));
        }

        match outcome {
            DisputeOutcome::NoAction => {
                // Reopen voting; the dispute bond stays locked for a later
                // terminal ruling or the stale unwind.
                job.status = JobStatus::CompletionRequested;
                job.disputed_at = None;
                info!(job_id, "↩️ Dispute ruled NoAction, voting reopened");
            }
            DisputeOutcome::AgentWin => {
                let plan = plan_settlement(job, &cfg, SettlementOutcome::AgentWin);
                self.settle(job, &mut state.active_jobs, plan, now).await?;
            }
            DisputeOutcome::EmployerWin => {
                let plan = plan_settlement(job, &cfg, SettlementOutcome::EmployerWin);
                self.settle(job, &mut state.active_jobs, plan, now).await?;
            }
        }

        // Only committed rulings are logged.
        self.events
            .emit(JobEvent::DisputeResolved {
                job_id,
                outcome,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Numeric-code variant of `resolve_dispute` for thin external callers.
    pub async fn resolve_dispute_with_code(
        &self,
        job_id: u64,
        moderator: AccountAddress,
        code: u8,
        now: i64,
    ) -> Result<()> {
        let outcome = DisputeOutcome::from_code(code).ok_or_else(|| {
            MarketError::InvalidParameters(format!("unknown dispute outcome code {}", code))
        })?;
        self.resolve_dispute(job_id, moderator, outcome, now).await
    }

    /// Owner safety valve for a dispute the moderators never ruled on.
    /// Usable while paused; refunds every party and closes the job.
    pub async fn resolve_stale_dispute(
        &self,
        job_id: u64,
        caller: AccountAddress,
        now: i64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        let cfg = self.config.read().await.clone();
        let mut state = self.state.write().await;
        let state = &mut *state;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(MarketError::NotFound(job_id))?;
        if job.status != JobStatus::Disputed {
            return Err(MarketError::InvalidState("job is not disputed".into()));
        }
        let disputed_at = job
            .disputed_at
            .ok_or_else(|| MarketError::InvalidState("job is not disputed".into()))?;
        if now <= disputed_at + cfg.dispute_review_period {
            return Err(MarketError::InvalidState(
                "dispute review period still open".into(),
            ));
        }

        let plan = plan_stale_unwind(job);
        self.settle(job, &mut state.active_jobs, plan, now).await?;

        warn!(job_id, "🧯 Stale dispute unwound by owner");
        self.events
            .emit(JobEvent::StaleDisputeResolved {
                job_id,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    // ========== Administration ==========

    /// Withdraw unobligated surplus. Requires the settlement pause so no
    /// in-flight obligation can race the withdrawal.
    pub async fn withdraw_surplus(
        &self,
        caller: AccountAddress,
        amount: AgiAmount,
        now: i64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        let state = self.state.read().await;
        if !state.settlement_paused {
            return Err(MarketError::InvalidState(
                "surplus withdrawal requires the settlement pause".into(),
            ));
        }
        drop(state);
        self.ledger.withdraw_surplus(amount).await?;
        self.events
            .emit(JobEvent::SurplusWithdrawn {
                amount,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Replace the protocol configuration. Refused while any escrow, bond,
    /// or dispute balance is outstanding, so in-flight obligations can
    /// never be repriced underfoot.
    pub async fn update_config(
        &self,
        caller: AccountAddress,
        new_config: ProtocolConfig,
        now: i64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        new_config.validate()?;
        // Tiers were validated against the reward pool in force when they
        // were registered; a new pool must leave room for every tier still
        // enabled, or a later settlement would plan more than the escrow.
        let top_tier = self.tiers.max_enabled_pct().await;
        if top_tier > new_config.max_tier_pct() {
            return Err(MarketError::InvalidParameters(format!(
                "enabled payout tier {}% exceeds the {}% left by the new validator reward",
                top_tier,
                new_config.max_tier_pct()
            )));
        }
        if !self.ledger.total_locked().await.is_zero() {
            return Err(MarketError::ConfigLocked(
                "escrow, bond, or dispute balances are outstanding".into(),
            ));
        }
        *self.config.write().await = new_config;
        info!("🔧 Protocol configuration replaced");
        self.events
            .emit(JobEvent::ConfigUpdated { timestamp: now })
            .await;
        Ok(())
    }

    /// Register or replace a payout tier. Live-safe: assigned jobs carry a
    /// snapshot and are unaffected.
    pub async fn register_payout_tier(
        &self,
        caller: AccountAddress,
        credential_type: u64,
        payout_pct: u8,
        enabled: bool,
    ) -> Result<()> {
        self.require_owner(caller)?;
        let cfg = self.config.read().await.clone();
        if payout_pct > cfg.max_tier_pct() {
            return Err(MarketError::InvalidParameters(
                "payout tier plus validator reward exceeds 100%".into(),
            ));
        }
        self.tiers.set_tier(credential_type, payout_pct, enabled).await;
        Ok(())
    }

    /// Allow-list an agent for the default payout tier. Live-safe.
    pub async fn set_agent_allowlisted(
        &self,
        caller: AccountAddress,
        agent: AccountAddress,
        allowed: bool,
    ) -> Result<()> {
        self.require_owner(caller)?;
        self.tiers.set_allowlisted(agent, allowed).await;
        Ok(())
    }

    /// Ban or unban an agent from new assignments. Live-safe.
    pub async fn set_blacklisted(
        &self,
        caller: AccountAddress,
        account: AccountAddress,
        banned: bool,
        now: i64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        let mut state = self.state.write().await;
        if banned {
            state.blacklist.insert(account);
        } else {
            state.blacklist.remove(&account);
        }
        self.events
            .emit(JobEvent::BlacklistUpdated {
                account,
                banned,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Swap the identity oracle. Live-safe: eligibility roots rotate
    /// without touching economic state.
    pub async fn set_identity_oracle(
        &self,
        caller: AccountAddress,
        oracle: Arc<dyn IdentityOracle>,
        now: i64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        *self.identity.write().await = oracle;
        self.events
            .emit(JobEvent::IdentityOracleReplaced { timestamp: now })
            .await;
        Ok(())
    }

    pub async fn set_intake_paused(
        &self,
        caller: AccountAddress,
        paused: bool,
        now: i64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        let mut state = self.state.write().await;
        state.intake_paused = paused;
        let event = JobEvent::PauseChanged {
            intake_paused: state.intake_paused,
            settlement_paused: state.settlement_paused,
            timestamp: now,
        };
        drop(state);
        self.events.emit(event).await;
        Ok(())
    }

    pub async fn set_settlement_paused(
        &self,
        caller: AccountAddress,
        paused: bool,
        now: i64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        let mut state = self.state.write().await;
        state.settlement_paused = paused;
        let event = JobEvent::PauseChanged {
            intake_paused: state.intake_paused,
            settlement_paused: state.settlement_paused,
            timestamp: now,
        };
        drop(state);
        self.events.emit(event).await;
        Ok(())
    }

    // ========== Accessors ==========

    pub async fn job(&self, job_id: u64) -> Option<Job> {
        self.state.read().await.jobs.get(&job_id).cloned()
    }

    pub async fn config(&self) -> ProtocolConfig {
        self.config.read().await.clone()
    }

    pub fn ledger(&self) -> &Arc<EscrowLedger> {
        &self.ledger
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn reputation_book(&self) -> &ReputationBook {
        &self.reputation
    }

    pub async fn reputation(&self, address: AccountAddress) -> u64 {
        self.reputation.score(address).await
    }

    pub async fn active_jobs(&self, agent: AccountAddress) -> u32 {
        self.state
            .read()
            .await
            .active_jobs
            .get(&agent)
            .copied()
            .unwrap_or(0)
    }

    pub async fn stats(&self) -> MarketStats {
        let state = self.state.read().await;
        let mut stats = MarketStats {
            total_jobs: state.next_job_id - 1,
            ..Default::default()
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Open => stats.open += 1,
                JobStatus::Assigned => stats.assigned += 1,
                JobStatus::CompletionRequested => stats.completion_requested += 1,
                JobStatus::Disputed => stats.disputed += 1,
                JobStatus::SettledAgentWin => stats.settled_agent_win += 1,
                JobStatus::SettledEmployerWin => stats.settled_employer_win += 1,
                JobStatus::Expired => stats.expired += 1,
                JobStatus::Cancelled => {}
            }
        }
        stats
    }

    // ========== Internals ==========

    fn require_owner(&self, caller: AccountAddress) -> Result<()> {
        if caller != self.owner {
            return Err(MarketError::NotAuthorized("owner only".into()));
        }
        Ok(())
    }

    async fn check_role(
        &self,
        role: Role,
        job_id: u64,
        caller: AccountAddress,
        label: &str,
        proof: &[u8],
    ) -> Result<()> {
        let oracle = self.identity.read().await.clone();
        if oracle.is_authorized(role, job_id, caller, label, proof).await {
            Ok(())
        } else {
            Err(MarketError::NotAuthorized(format!(
                "{} authorization failed for {}",
                role, caller
            )))
        }
    }

    fn release_agent_slot(
        active_jobs: &mut HashMap<AccountAddress, u32>,
        agent: Option<AccountAddress>,
    ) {
        if let Some(agent) = agent {
            if let Some(count) = active_jobs.get_mut(&agent) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Move every amount the plan names through the ledger. The plan fully
    /// accounts for the escrow and every posted bond, so the four locked
    /// counters return to zero for this job.
    async fn apply_plan(&self, plan: &SettlementPlan) -> Result<()> {
        let escrow_out = plan
            .agent_payment
            .saturating_add(plan.employer_refund)
            .saturating_add(plan.total_rewards());
        self.ledger
            .release_to_party(LockClass::Escrow, escrow_out)
            .await?;
        self.ledger
            .release_to_surplus(LockClass::Escrow, plan.escrow_surplus)
            .await?;

        let agent_bond_out = plan
            .agent_bond_refund
            .saturating_add(plan.agent_bond_to_employer);
        self.ledger
            .release_to_party(LockClass::AgentBond, agent_bond_out)
            .await?;
        self.ledger
            .release_to_surplus(LockClass::AgentBond, plan.agent_bond_surplus)
            .await?;

        let mut voter_refunds = AgiAmount::ZERO;
        let mut voter_slashes = AgiAmount::ZERO;
        for share in &plan.voters {
            voter_refunds = voter_refunds.saturating_add(share.bond_refund);
            voter_slashes = voter_slashes.saturating_add(share.slashed);
        }
        self.ledger
            .release_to_party(LockClass::ValidatorBond, voter_refunds)
            .await?;
        self.ledger
            .release_to_surplus(LockClass::ValidatorBond, voter_slashes)
            .await?;

        self.ledger
            .release_to_party(LockClass::DisputeBond, plan.dispute_bond_refund)
            .await?;
        self.ledger
            .release_to_surplus(LockClass::DisputeBond, plan.dispute_bond_surplus)
            .await?;
        Ok(())
    }

    /// Terminal settlement: ledger application, status flip, agent slot
    /// release, reputation, certificate, events.
    async fn settle(
        &self,
        job: &mut Job,
        active_jobs: &mut HashMap<AccountAddress, u32>,
        plan: SettlementPlan,
        now: i64,
    ) -> Result<()> {
        self.apply_plan(&plan).await?;

        job.status = match plan.outcome {
            SettlementOutcome::AgentWin => JobStatus::SettledAgentWin,
            SettlementOutcome::EmployerWin => JobStatus::SettledEmployerWin,
        };
        Self::release_agent_slot(active_jobs, job.assigned_agent);

        if plan.reputation_eligible && plan.outcome == SettlementOutcome::AgentWin {
            if let Some(agent) = job.assigned_agent {
                let delta = reputation_delta(
                    job.payout,
                    job.duration,
                    now,
                    job.assigned_at.unwrap_or(now),
                    true,
                );
                self.reputation.apply(agent, delta).await;
            }
        }

        info!(
            job_id = job.job_id,
            outcome = ?plan.outcome,
            agent_paid = plan.agent_payment.to_agi(),
            employer_refund = plan.employer_refund.to_agi(),
            surplus = plan
                .escrow_surplus
                .saturating_add(plan.agent_bond_surplus)
                .saturating_add(plan.dispute_bond_surplus)
                .to_agi(),
            "✅ Job settled"
        );
        self.events
            .emit(JobEvent::JobSettled {
                job_id: job.job_id,
                outcome: plan.outcome,
                agent_paid: plan.agent_payment,
                employer_refund: plan.employer_refund,
                surplus: plan
                    .escrow_surplus
                    .saturating_add(plan.agent_bond_surplus)
                    .saturating_add(plan.dispute_bond_surplus),
                timestamp: now,
            })
            .await;

        if plan.outcome == SettlementOutcome::AgentWin {
            // Best-effort external call: a failing issuer must never roll
            // back the settlement.
            let token_id = certificate_token_id(job.job_id, job.employer);
            if let Err(err) = self.certificates.mint(job.employer, token_id).await {
                warn!(
                    job_id = job.job_id,
                    error = %err,
                    "Certificate mint failed; settlement unaffected"
                );
                self.events
                    .emit(JobEvent::ExternalCallFailed {
                        job_id: job.job_id,
                        detail: format!("certificate mint: {}", err),
                        timestamp: now,
                    })
                    .await;
            }
        }
        Ok(())
    }
}
