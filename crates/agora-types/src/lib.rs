//! Shared primitive types for the Agora escrow and settlement engine:
//! token amounts, account addresses, and participant roles.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const AGI_DECIMALS: u32 = 8;
pub const AGI_BASE_UNIT: u64 = 100_000_000; // 10^8

/// Denominator for basis-point arithmetic (10_000 bps = 100%).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Fixed-point AGI token amount in base units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AgiAmount(u64);

impl AgiAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_agi(agi: f64) -> Self {
        Self((agi * AGI_BASE_UNIT as f64) as u64)
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_agi(&self) -> f64 {
        self.0 as f64 / AGI_BASE_UNIT as f64
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Scale the amount by a basis-point fraction using a widening
    /// intermediate so the product cannot overflow.
    pub fn scale_bps(&self, bps: u64) -> Self {
        let scaled = (self.0 as u128 * bps as u128) / BPS_DENOMINATOR as u128;
        Self(scaled as u64)
    }

    /// Scale the amount by a whole percentage (0..=100).
    pub fn scale_pct(&self, pct: u8) -> Self {
        let scaled = (self.0 as u128 * pct as u128) / 100u128;
        Self(scaled as u64)
    }

    /// Clamp into `[min, max]`. Callers are expected to pass `min <= max`.
    pub fn clamp_to(&self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }

    pub fn min(&self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }
}

impl fmt::Display for AgiAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8} AGI", self.to_agi())
    }
}

/// Opaque 32-byte account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

/// Participant roles checked against the identity oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Agent,
    Validator,
    Moderator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Agent => write!(f, "agent"),
            Role::Validator => write!(f, "validator"),
            Role::Moderator => write!(f, "moderator"),
        }
    }
}

/// Current wall-clock time as unix seconds. Operations take `now` as an
/// explicit argument; this is the convenience for production callers.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
