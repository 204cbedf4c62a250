//! Bond sizing. Both functions are pure: they are invoked exactly once at
//! the snapshot point (assignment or vote) and the result is copied into the
//! job record, so later parameter changes never resize a posted bond.

use crate::error::{MarketError, Result};
use agora_types::{AgiAmount, BPS_DENOMINATOR};

/// Size the agent bond from the escrowed payout and the deadline window.
///
/// The raw bond is `payout * bps / 10_000` scaled down by
/// `min(duration, duration_limit) / duration_limit`, then clamped to
/// `[min, max]` and capped at `payout`. A zero payout always yields a zero
/// bond, and a longer duration never yields a smaller bond for equal payout.
pub fn agent_bond(
    payout: AgiAmount,
    duration: i64,
    bps: u64,
    min: AgiAmount,
    max: AgiAmount,
    duration_limit: i64,
) -> AgiAmount {
    if payout.is_zero() || duration_limit <= 0 {
        return AgiAmount::ZERO;
    }
    let effective = duration.clamp(0, duration_limit) as u128;
    let raw = (payout.to_base_units() as u128 * bps as u128 * effective)
        / (BPS_DENOMINATOR as u128 * duration_limit as u128);
    AgiAmount::from_base_units(raw as u64)
        .clamp_to(min, max)
        .min(payout)
}

/// Size a validator's vote bond from the current job payout.
///
/// The all-zero `(bps, min, max)` triple disables bonding entirely; any
/// other combination with `max == 0` is a misconfiguration.
pub fn validator_bond(
    payout: AgiAmount,
    bps: u64,
    min: AgiAmount,
    max: AgiAmount,
) -> Result<AgiAmount> {
    if bps == 0 && min.is_zero() && max.is_zero() {
        return Ok(AgiAmount::ZERO);
    }
    if max.is_zero() {
        return Err(MarketError::InvalidParameters(
            "validator bond max is zero with bonding enabled".into(),
        ));
    }
    if payout.is_zero() {
        return Ok(AgiAmount::ZERO);
    }
    Ok(payout.scale_bps(bps).clamp_to(min, max).min(payout))
}
