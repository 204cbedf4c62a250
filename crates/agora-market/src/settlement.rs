//! Settlement arithmetic. Planning is pure: given a job, the configuration,
//! and the decided outcome, it produces a `SettlementPlan` that fully
//! accounts for the escrow, every posted bond, and the reward pool. The
//! registry then applies the plan to the ledger in one pass, so the numbers
//! here are the single source of truth for who gets what.

use crate::config::ProtocolConfig;
use crate::types::{Job, SettlementOutcome, VoteChoice};
use agora_types::{AccountAddress, AgiAmount};
use serde::{Deserialize, Serialize};

/// One validator's settlement share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterShare {
    pub validator: AccountAddress,
    /// Bond posted at vote time.
    pub bond: AgiAmount,
    /// Portion of the bond returned to the validator.
    pub bond_refund: AgiAmount,
    /// Reward-pool share, zero for incorrect voters.
    pub reward: AgiAmount,
    /// Portion of the bond forfeited to treasury surplus.
    pub slashed: AgiAmount,
}

/// Complete accounting of one terminal settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub outcome: SettlementOutcome,
    /// Nobody voted and the review period elapsed.
    pub zero_vote: bool,

    /// Paid to the agent from the escrow.
    pub agent_payment: AgiAmount,
    /// Refunded to the employer from the escrow (rebate or win refund).
    pub employer_refund: AgiAmount,
    /// Escrow remainder accruing to treasury surplus.
    pub escrow_surplus: AgiAmount,

    pub agent_bond_refund: AgiAmount,
    /// Agent-bond share slashed to the employer (expiry path only).
    pub agent_bond_to_employer: AgiAmount,
    pub agent_bond_surplus: AgiAmount,

    pub dispute_bond_refund: AgiAmount,
    pub dispute_bond_surplus: AgiAmount,

    pub voters: Vec<VoterShare>,
    /// At least one validator participated; the agent's reputation moves.
    pub reputation_eligible: bool,
}

impl SettlementPlan {
    /// Escrow leaving the engine plus escrow retained as surplus; must equal
    /// the job payout.
    pub fn escrow_accounted(&self) -> AgiAmount {
        let rewards = self
            .voters
            .iter()
            .fold(AgiAmount::ZERO, |acc, v| acc.saturating_add(v.reward));
        self.agent_payment
            .saturating_add(self.employer_refund)
            .saturating_add(self.escrow_surplus)
            .saturating_add(rewards)
    }

    pub fn total_rewards(&self) -> AgiAmount {
        self.voters
            .iter()
            .fold(AgiAmount::ZERO, |acc, v| acc.saturating_add(v.reward))
    }
}

/// Plan a quorum, slow-path, or moderator settlement.
pub fn plan_settlement(
    job: &Job,
    cfg: &ProtocolConfig,
    outcome: SettlementOutcome,
) -> SettlementPlan {
    let payout = job.payout;
    let zero_vote = job.votes.is_empty();
    let reward_pool = payout.scale_bps(cfg.validation_reward_bps);

    let winning_choice = match outcome {
        SettlementOutcome::AgentWin => VoteChoice::Approve,
        SettlementOutcome::EmployerWin => VoteChoice::Disapprove,
    };

    // Deterministic ordering for reproducible plans.
    let mut votes: Vec<(AccountAddress, VoteChoice, AgiAmount)> = job
        .votes
        .iter()
        .map(|(addr, rec)| (*addr, rec.choice, rec.bond))
        .collect();
    votes.sort_by_key(|(addr, _, _)| *addr);

    let correct_count = votes
        .iter()
        .filter(|(_, choice, _)| *choice == winning_choice)
        .count() as u64;
    let reward_each = if correct_count > 0 {
        AgiAmount::from_base_units(reward_pool.to_base_units() / correct_count)
    } else {
        AgiAmount::ZERO
    };

    let mut distributed = AgiAmount::ZERO;
    let voters: Vec<VoterShare> = votes
        .into_iter()
        .map(|(validator, choice, bond)| {
            if choice == winning_choice {
                distributed = distributed.saturating_add(reward_each);
                VoterShare {
                    validator,
                    bond,
                    bond_refund: bond,
                    reward: reward_each,
                    slashed: AgiAmount::ZERO,
                }
            } else {
                let slashed = bond.scale_bps(cfg.validator_slash_bps);
                VoterShare {
                    validator,
                    bond,
                    bond_refund: bond.saturating_sub(slashed),
                    reward: AgiAmount::ZERO,
                    slashed,
                }
            }
        })
        .collect();

    match outcome {
        SettlementOutcome::AgentWin => {
            // The unused reward budget is rebated to the employer when
            // nobody voted; with votes cast, any undistributed remainder
            // accrues to surplus.
            let employer_refund = if zero_vote { reward_pool } else { AgiAmount::ZERO };
            // Rewards and the rebate are reserved first and the tier share
            // is clamped to the remainder, so the plan can never release
            // more escrow than the job holds.
            let reserved = distributed.saturating_add(employer_refund);
            let agent_payment = payout
                .scale_pct(job.agent_payout_pct)
                .min(payout.saturating_sub(reserved));
            let escrow_surplus = payout
                .saturating_sub(agent_payment)
                .saturating_sub(reserved);

            SettlementPlan {
                outcome,
                zero_vote,
                agent_payment,
                employer_refund,
                escrow_surplus,
                agent_bond_refund: job.agent_bond,
                agent_bond_to_employer: AgiAmount::ZERO,
                agent_bond_surplus: AgiAmount::ZERO,
                dispute_bond_refund: AgiAmount::ZERO,
                dispute_bond_surplus: job.dispute_bond,
                voters,
                reputation_eligible: !zero_vote,
            }
        }
        SettlementOutcome::EmployerWin => {
            let employer_refund = payout.saturating_sub(distributed);
            let agent_bond_surplus = job.agent_bond.scale_bps(cfg.agent_dispute_slash_bps);

            SettlementPlan {
                outcome,
                zero_vote,
                agent_payment: AgiAmount::ZERO,
                employer_refund,
                escrow_surplus: AgiAmount::ZERO,
                agent_bond_refund: job.agent_bond.saturating_sub(agent_bond_surplus),
                agent_bond_to_employer: AgiAmount::ZERO,
                agent_bond_surplus,
                dispute_bond_refund: job.dispute_bond,
                dispute_bond_surplus: AgiAmount::ZERO,
                voters,
                reputation_eligible: false,
            }
        }
    }
}

/// Plan the unexcused-expiry settlement: the employer is made whole and
/// receives the configured share of the agent bond.
pub fn plan_expiry(job: &Job, cfg: &ProtocolConfig) -> SettlementPlan {
    let to_employer = job.agent_bond.scale_bps(cfg.expiry_slash_bps);
    SettlementPlan {
        outcome: SettlementOutcome::EmployerWin,
        zero_vote: true,
        agent_payment: AgiAmount::ZERO,
        employer_refund: job.payout,
        escrow_surplus: AgiAmount::ZERO,
        agent_bond_refund: job.agent_bond.saturating_sub(to_employer),
        agent_bond_to_employer: to_employer,
        agent_bond_surplus: AgiAmount::ZERO,
        dispute_bond_refund: AgiAmount::ZERO,
        dispute_bond_surplus: AgiAmount::ZERO,
        voters: Vec::new(),
        reputation_eligible: false,
    }
}

/// Plan the stale-dispute unwind: every party is refunded in full, nobody is
/// rewarded, nobody is slashed. The safety valve must never be the
/// profitable path for either side.
pub fn plan_stale_unwind(job: &Job) -> SettlementPlan {
    let mut voters: Vec<VoterShare> = job
        .votes
        .iter()
        .map(|(addr, rec)| VoterShare {
            validator: *addr,
            bond: rec.bond,
            bond_refund: rec.bond,
            reward: AgiAmount::ZERO,
            slashed: AgiAmount::ZERO,
        })
        .collect();
    voters.sort_by_key(|v| v.validator);

    SettlementPlan {
        outcome: SettlementOutcome::EmployerWin,
        zero_vote: job.votes.is_empty(),
        agent_payment: AgiAmount::ZERO,
        employer_refund: job.payout,
        escrow_surplus: AgiAmount::ZERO,
        agent_bond_refund: job.agent_bond,
        agent_bond_to_employer: AgiAmount::ZERO,
        agent_bond_surplus: AgiAmount::ZERO,
        dispute_bond_refund: job.dispute_bond,
        dispute_bond_surplus: AgiAmount::ZERO,
        voters,
        reputation_eligible: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobStatus, VoteRecord};
    use std::collections::HashMap;

    fn addr(b: u8) -> AccountAddress {
        AccountAddress::from_bytes([b; 32])
    }

    fn agi(x: f64) -> AgiAmount {
        AgiAmount::from_agi(x)
    }

    fn test_job(payout: AgiAmount, pct: u8, agent_bond: AgiAmount) -> Job {
        Job {
            job_id: 1,
            employer: addr(0xE0),
            assigned_agent: Some(addr(0xA0)),
            payout,
            agent_payout_pct: pct,
            agent_bond,
            dispute_bond: AgiAmount::ZERO,
            duration: 86_400,
            created_at: 0,
            assigned_at: Some(0),
            completion_requested_at: Some(100),
            disputed_at: None,
            approval_quorum_at: None,
            job_spec_uri: "ipfs://spec".into(),
            job_completion_uri: Some("ipfs://done".into()),
            details: String::new(),
            approvals: 0,
            disapprovals: 0,
            votes: HashMap::new(),
            status: JobStatus::CompletionRequested,
        }
    }

    fn vote(job: &mut Job, validator: AccountAddress, choice: VoteChoice, bond: AgiAmount) {
        job.votes.insert(
            validator,
            VoteRecord {
                choice,
                bond,
                cast_at: 200,
            },
        );
        match choice {
            VoteChoice::Approve => job.approvals += 1,
            VoteChoice::Disapprove => job.disapprovals += 1,
        }
    }

    #[test]
    fn test_agent_win_accounts_for_full_escrow() {
        let cfg = ProtocolConfig::default();
        let mut job = test_job(agi(100.0), 92, agi(10.0));
        vote(&mut job, addr(1), VoteChoice::Approve, agi(2.0));
        vote(&mut job, addr(2), VoteChoice::Disapprove, agi(2.0));

        let plan = plan_settlement(&job, &cfg, SettlementOutcome::AgentWin);
        assert_eq!(plan.agent_payment, agi(92.0));
        // 5% reward pool split among the single correct voter.
        assert_eq!(plan.total_rewards(), agi(5.0));
        assert_eq!(plan.employer_refund, AgiAmount::ZERO);
        assert_eq!(plan.escrow_surplus, agi(3.0));
        assert_eq!(plan.escrow_accounted(), job.payout);
        assert!(plan.reputation_eligible);

        let approver = plan.voters.iter().find(|v| v.validator == addr(1)).unwrap();
        assert_eq!(approver.bond_refund, agi(2.0));
        assert_eq!(approver.reward, agi(5.0));
        let dissenter = plan.voters.iter().find(|v| v.validator == addr(2)).unwrap();
        // 50% slash
        assert_eq!(dissenter.slashed, agi(1.0));
        assert_eq!(dissenter.bond_refund, agi(1.0));
        assert_eq!(dissenter.reward, AgiAmount::ZERO);
    }

    #[test]
    fn test_zero_vote_settlement_rebates_reward_budget() {
        let cfg = ProtocolConfig::default();
        let job = test_job(agi(100.0), 92, agi(10.0));

        let plan = plan_settlement(&job, &cfg, SettlementOutcome::AgentWin);
        assert!(plan.zero_vote);
        assert_eq!(plan.agent_payment, agi(92.0));
        assert_eq!(plan.employer_refund, agi(5.0));
        assert_eq!(plan.escrow_surplus, agi(3.0));
        assert_eq!(plan.escrow_accounted(), job.payout);
        assert!(!plan.reputation_eligible);
    }

    #[test]
    fn test_employer_win_refund_is_net_of_rewards() {
        let cfg = ProtocolConfig::default();
        let mut job = test_job(agi(100.0), 92, agi(10.0));
        job.dispute_bond = agi(5.0);
        vote(&mut job, addr(1), VoteChoice::Disapprove, agi(2.0));
        vote(&mut job, addr(2), VoteChoice::Disapprove, agi(2.0));
        vote(&mut job, addr(3), VoteChoice::Approve, agi(2.0));

        let plan = plan_settlement(&job, &cfg, SettlementOutcome::EmployerWin);
        // 5 AGI pool split between the two disapprovers.
        assert_eq!(plan.total_rewards(), agi(5.0));
        assert_eq!(plan.employer_refund, agi(95.0));
        assert_eq!(plan.escrow_accounted(), job.payout);
        assert_eq!(plan.dispute_bond_refund, agi(5.0));
        // Agent bond slashed 50% to surplus.
        assert_eq!(plan.agent_bond_surplus, agi(5.0));
        assert_eq!(plan.agent_bond_refund, agi(5.0));
        assert!(!plan.reputation_eligible);
    }

    #[test]
    fn test_agent_win_via_moderator_with_all_wrong_voters() {
        let cfg = ProtocolConfig::default();
        let mut job = test_job(agi(100.0), 80, agi(10.0));
        job.dispute_bond = agi(5.0);
        vote(&mut job, addr(1), VoteChoice::Disapprove, agi(2.0));

        let plan = plan_settlement(&job, &cfg, SettlementOutcome::AgentWin);
        // No correct voter: the reward pool stays in the engine as surplus.
        assert_eq!(plan.total_rewards(), AgiAmount::ZERO);
        assert_eq!(plan.agent_payment, agi(80.0));
        assert_eq!(plan.escrow_surplus, agi(20.0));
        // The employer lost the dispute; their bond is forfeited.
        assert_eq!(plan.dispute_bond_surplus, agi(5.0));
        assert_eq!(plan.escrow_accounted(), job.payout);
    }

    #[test]
    fn test_tier_share_clamped_to_remaining_escrow() {
        // A 95% tier registered before the reward pool grew to 10% would
        // otherwise plan 105% of the escrow.
        let cfg = ProtocolConfig {
            validation_reward_bps: 1_000,
            ..Default::default()
        };
        let mut job = test_job(agi(100.0), 95, agi(10.0));
        vote(&mut job, addr(1), VoteChoice::Approve, agi(2.0));

        let plan = plan_settlement(&job, &cfg, SettlementOutcome::AgentWin);
        assert_eq!(plan.total_rewards(), agi(10.0));
        assert_eq!(plan.agent_payment, agi(90.0));
        assert_eq!(plan.escrow_surplus, AgiAmount::ZERO);
        assert_eq!(plan.escrow_accounted(), job.payout);
    }

    #[test]
    fn test_reward_division_remainder_goes_to_surplus() {
        let cfg = ProtocolConfig::default();
        // 1/3 of the pool cannot divide evenly in base units.
        let mut job = test_job(AgiAmount::from_base_units(10_000_000_001), 90, agi(1.0));
        for b in 1..=3u8 {
            vote(&mut job, addr(b), VoteChoice::Approve, agi(0.5));
        }

        let plan = plan_settlement(&job, &cfg, SettlementOutcome::AgentWin);
        assert_eq!(plan.escrow_accounted(), job.payout);
    }

    #[test]
    fn test_expiry_plan_splits_agent_bond() {
        let cfg = ProtocolConfig::default();
        let job = test_job(agi(100.0), 92, agi(10.0));

        let plan = plan_expiry(&job, &cfg);
        assert_eq!(plan.employer_refund, agi(100.0));
        assert_eq!(plan.agent_bond_to_employer, agi(5.0));
        assert_eq!(plan.agent_bond_refund, agi(5.0));
        assert_eq!(plan.escrow_accounted(), job.payout);
    }

    #[test]
    fn test_stale_unwind_refunds_everyone() {
        let mut job = test_job(agi(100.0), 92, agi(10.0));
        job.dispute_bond = agi(5.0);
        vote(&mut job, addr(1), VoteChoice::Approve, agi(2.0));
        vote(&mut job, addr(2), VoteChoice::Disapprove, agi(2.0));

        let plan = plan_stale_unwind(&job);
        assert_eq!(plan.employer_refund, agi(100.0));
        assert_eq!(plan.agent_bond_refund, agi(10.0));
        assert_eq!(plan.dispute_bond_refund, agi(5.0));
        assert_eq!(plan.total_rewards(), AgiAmount::ZERO);
        for share in &plan.voters {
            assert_eq!(share.bond_refund, share.bond);
            assert_eq!(share.slashed, AgiAmount::ZERO);
        }
        assert!(!plan.reputation_eligible);
    }
}
