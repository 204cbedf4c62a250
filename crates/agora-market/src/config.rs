use crate::error::{MarketError, Result};
use agora_types::{AgiAmount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

const DAY: i64 = 86_400;

/// Protocol parameters. The full struct is replaced atomically via
/// `JobRegistry::update_config`, which refuses the change while any escrow,
/// bond, or dispute balance is outstanding; bond sizes and payout tiers are
/// snapshotted into jobs at posting time, so a later change never touches an
/// in-flight obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Maximum escrow accepted for a single job.
    pub max_job_payout: AgiAmount,
    /// Maximum deadline window, seconds.
    pub max_job_duration: i64,
    /// Maximum concurrently assigned jobs per agent.
    pub max_active_jobs_per_agent: u32,

    /// Approvals required for an immediate agent-win settlement.
    pub required_approvals: u32,
    /// Disapprovals required to freeze voting and dispute the job.
    pub required_disapprovals: u32,
    /// Validator review window after a completion request, seconds.
    pub review_period: i64,
    /// Post-approval challenge window, seconds. Zero settles immediately on
    /// quorum.
    pub approval_challenge_window: i64,
    /// How long a dispute may sit unresolved before the owner safety valve
    /// becomes legal, seconds.
    pub dispute_review_period: i64,

    /// Validator reward pool as bps of the job payout.
    pub validation_reward_bps: u64,

    /// Agent bond sizing: bps of payout, scaled by duration, clamped.
    pub agent_bond_bps: u64,
    pub agent_bond_min: AgiAmount,
    pub agent_bond_max: AgiAmount,
    /// Duration at which the agent bond reaches its full bps size, seconds.
    pub agent_duration_limit: i64,

    /// Validator bond sizing: bps of payout, clamped. The all-zero triple
    /// disables validator bonding.
    pub validator_bond_bps: u64,
    pub validator_bond_min: AgiAmount,
    pub validator_bond_max: AgiAmount,

    /// Fraction of an incorrect voter's bond forfeited to surplus, bps.
    pub validator_slash_bps: u64,
    /// Fraction of the agent bond slashed to the employer on unexcused
    /// expiry, bps.
    pub expiry_slash_bps: u64,
    /// Fraction of the agent bond forfeited to surplus when the employer
    /// wins a dispute, bps.
    pub agent_dispute_slash_bps: u64,

    /// Dispute bond sizing: bps of payout, clamped.
    pub dispute_bond_bps: u64,
    pub dispute_bond_min: AgiAmount,
    pub dispute_bond_max: AgiAmount,

    /// Payout percentage for allow-listed agents holding no tier credential.
    pub default_payout_pct: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_job_payout: AgiAmount::from_agi(10_000.0),
            max_job_duration: 30 * DAY,
            max_active_jobs_per_agent: 5,

            required_approvals: 3,
            required_disapprovals: 3,
            review_period: 7 * DAY,
            approval_challenge_window: 0,
            dispute_review_period: 14 * DAY,

            validation_reward_bps: 500, // 5% of payout

            agent_bond_bps: 1_000, // 10% of payout at full duration
            agent_bond_min: AgiAmount::from_agi(1.0),
            agent_bond_max: AgiAmount::from_agi(500.0),
            agent_duration_limit: 30 * DAY,

            validator_bond_bps: 200, // 2% of payout
            validator_bond_min: AgiAmount::from_agi(0.5),
            validator_bond_max: AgiAmount::from_agi(100.0),

            validator_slash_bps: 5_000,
            expiry_slash_bps: 5_000,
            agent_dispute_slash_bps: 5_000,

            dispute_bond_bps: 1_000,
            dispute_bond_min: AgiAmount::from_agi(1.0),
            dispute_bond_max: AgiAmount::from_agi(200.0),

            default_payout_pct: 0,
        }
    }
}

impl ProtocolConfig {
    /// Reject malformed or economically unsafe parameter combinations.
    pub fn validate(&self) -> Result<()> {
        for (name, bps) in [
            ("validation_reward_bps", self.validation_reward_bps),
            ("agent_bond_bps", self.agent_bond_bps),
            ("validator_bond_bps", self.validator_bond_bps),
            ("validator_slash_bps", self.validator_slash_bps),
            ("expiry_slash_bps", self.expiry_slash_bps),
            ("agent_dispute_slash_bps", self.agent_dispute_slash_bps),
            ("dispute_bond_bps", self.dispute_bond_bps),
        ] {
            if bps > BPS_DENOMINATOR {
                return Err(MarketError::InvalidParameters(format!(
                    "{} exceeds {} bps",
                    name, BPS_DENOMINATOR
                )));
            }
        }

        if self.required_approvals == 0 || self.required_disapprovals == 0 {
            return Err(MarketError::InvalidParameters(
                "vote thresholds must be at least 1".into(),
            ));
        }
        if self.review_period <= 0 || self.dispute_review_period <= 0 {
            return Err(MarketError::InvalidParameters(
                "review periods must be positive".into(),
            ));
        }
        if self.approval_challenge_window < 0 {
            return Err(MarketError::InvalidParameters(
                "challenge window cannot be negative".into(),
            ));
        }
        if self.max_job_duration <= 0 || self.agent_duration_limit <= 0 {
            return Err(MarketError::InvalidParameters(
                "durations must be positive".into(),
            ));
        }
        if self.max_active_jobs_per_agent == 0 {
            return Err(MarketError::InvalidParameters(
                "max active jobs per agent must be at least 1".into(),
            ));
        }
        if self.agent_bond_min > self.agent_bond_max {
            return Err(MarketError::InvalidParameters(
                "agent bond min exceeds max".into(),
            ));
        }
        if self.dispute_bond_min > self.dispute_bond_max {
            return Err(MarketError::InvalidParameters(
                "dispute bond min exceeds max".into(),
            ));
        }

        // The all-zero triple disables validator bonding; any other
        // combination needs a usable clamp range.
        let triple = (
            self.validator_bond_bps,
            self.validator_bond_min,
            self.validator_bond_max,
        );
        if triple != (0, AgiAmount::ZERO, AgiAmount::ZERO) {
            if self.validator_bond_max.is_zero() {
                return Err(MarketError::InvalidParameters(
                    "validator bond max is zero with bonding enabled".into(),
                ));
            }
            if self.validator_bond_min > self.validator_bond_max {
                return Err(MarketError::InvalidParameters(
                    "validator bond min exceeds max".into(),
                ));
            }
        }

        if self.default_payout_pct > 100 {
            return Err(MarketError::InvalidParameters(
                "default payout pct exceeds 100".into(),
            ));
        }
        if self.default_payout_pct as u64 * 100 + self.validation_reward_bps > BPS_DENOMINATOR {
            return Err(MarketError::InvalidParameters(
                "default payout pct plus validator reward exceeds 100%".into(),
            ));
        }

        Ok(())
    }

    /// Highest payout percentage a tier may carry without the tier share
    /// plus the reward pool exceeding the escrowed payout.
    pub fn max_tier_pct(&self) -> u8 {
        ((BPS_DENOMINATOR - self.validation_reward_bps) / 100) as u8
    }

    pub fn validator_bonding_disabled(&self) -> bool {
        self.validator_bond_bps == 0
            && self.validator_bond_min.is_zero()
            && self.validator_bond_max.is_zero()
    }
}
