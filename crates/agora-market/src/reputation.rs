//! Reputation scoring. The delta function is pure and deterministic; the
//! stored score is saturating and never decreases.

use crate::types::MAX_REPUTATION;
use agora_types::{AccountAddress, AgiAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Weight applied to the payout magnitude term.
pub const REP_PAYOUT_WEIGHT: u64 = 10;
/// Upper bound on the early-finish bonus, so payout always dominates speed.
pub const REP_TIME_BONUS_MAX: u64 = 25;

/// Score earned by the agent for one settled job.
///
/// Returns `0` when `eligible` is false (no validator participated in the
/// settlement). Otherwise the score is dominated by payout magnitude, with a
/// bounded bonus that shrinks linearly as completion latency approaches the
/// full duration. Monotone non-increasing in latency.
pub fn reputation_delta(
    payout: AgiAmount,
    duration: i64,
    completed_at: i64,
    assigned_at: i64,
    eligible: bool,
) -> u64 {
    if !eligible || payout.is_zero() || duration <= 0 {
        return 0;
    }

    let magnitude = payout.to_base_units().saturating_add(1).ilog2() as u64;
    let payout_term = magnitude * REP_PAYOUT_WEIGHT;

    let latency = (completed_at - assigned_at).max(0);
    let time_bonus = if latency >= duration {
        0
    } else {
        let remaining = (duration - latency) as u128;
        (REP_TIME_BONUS_MAX as u128 * remaining / duration as u128) as u64
    };

    payout_term + time_bonus
}

/// Per-address reputation scores: non-negative, monotone non-decreasing,
/// saturating at `MAX_REPUTATION`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationSnapshot {
    pub scores: HashMap<AccountAddress, u64>,
}

pub struct ReputationBook {
    scores: Arc<RwLock<HashMap<AccountAddress, u64>>>,
}

impl Default for ReputationBook {
    fn default() -> Self {
        Self::new()
    }
}

impl ReputationBook {
    pub fn new() -> Self {
        Self {
            scores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add `delta` to the stored score, saturating at the cap. Returns the
    /// new score.
    pub async fn apply(&self, address: AccountAddress, delta: u64) -> u64 {
        if delta == 0 {
            return self.score(address).await;
        }
        let mut scores = self.scores.write().await;
        let entry = scores.entry(address).or_insert(0);
        let before = *entry;
        *entry = entry.saturating_add(delta).min(MAX_REPUTATION);
        debug!(
            address = %address,
            before,
            after = *entry,
            delta,
            "Reputation updated"
        );
        *entry
    }

    pub async fn score(&self, address: AccountAddress) -> u64 {
        *self.scores.read().await.get(&address).unwrap_or(&0)
    }

    pub async fn snapshot(&self) -> ReputationSnapshot {
        ReputationSnapshot {
            scores: self.scores.read().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    #[test]
    fn test_ineligible_is_zero() {
        let delta = reputation_delta(AgiAmount::from_agi(1_000.0), 10 * DAY, 5 * DAY, 0, false);
        assert_eq!(delta, 0);
    }

    #[test]
    fn test_payout_dominates_speed() {
        // A big payout finished at the deadline beats a small payout
        // finished instantly.
        let slow_big = reputation_delta(
            AgiAmount::from_agi(5_000.0),
            10 * DAY,
            10 * DAY - 1,
            0,
            true,
        );
        let fast_small = reputation_delta(AgiAmount::from_agi(1.0), 10 * DAY, 0, 0, true);
        assert!(slow_big > fast_small);
    }

    #[test]
    fn test_monotone_in_latency() {
        let payout = AgiAmount::from_agi(100.0);
        let mut prev = u64::MAX;
        for latency_days in 0..=12 {
            let delta = reputation_delta(payout, 10 * DAY, latency_days * DAY, 0, true);
            assert!(delta <= prev, "delta grew at latency {} days", latency_days);
            prev = delta;
        }
        // Past the deadline the bonus is exactly zero.
        let at_deadline = reputation_delta(payout, 10 * DAY, 10 * DAY, 0, true);
        let way_past = reputation_delta(payout, 10 * DAY, 100 * DAY, 0, true);
        assert_eq!(at_deadline, way_past);
    }

    #[test]
    fn test_bonus_is_bounded() {
        let payout = AgiAmount::from_agi(100.0);
        let instant = reputation_delta(payout, 10 * DAY, 0, 0, true);
        let at_deadline = reputation_delta(payout, 10 * DAY, 10 * DAY, 0, true);
        assert!(instant - at_deadline <= REP_TIME_BONUS_MAX);
    }

    #[tokio::test]
    async fn test_book_saturates_and_never_decreases() {
        let book = ReputationBook::new();
        let addr = AccountAddress::from_bytes([1; 32]);

        assert_eq!(book.score(addr).await, 0);
        let s1 = book.apply(addr, 300).await;
        let s2 = book.apply(addr, 0).await;
        assert_eq!(s1, 300);
        assert_eq!(s2, 300);

        let s3 = book.apply(addr, u64::MAX).await;
        assert_eq!(s3, MAX_REPUTATION);
        let s4 = book.apply(addr, 1).await;
        assert_eq!(s4, MAX_REPUTATION);
    }
}
