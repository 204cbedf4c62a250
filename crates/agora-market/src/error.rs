use thiserror::Error;

/// Result type for market operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Market error taxonomy. Every failure is an atomic rejection: no partial
/// state change is observable after any of these is returned.
#[derive(Error, Debug, Clone)]
pub enum MarketError {
    /// Unknown job id
    #[error("Job not found: {0}")]
    NotFound(u64),

    /// Role or identity check failed (the oracle fails closed)
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Action illegal in the job's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed or economically unsafe input/configuration
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The resolved payout tier for the applying agent is zero
    #[error("Agent payout tier resolved to zero")]
    IneligibleAgentPayout,

    /// Underlying value transfer did not complete
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Protected parameter changed while obligations are outstanding
    #[error("Configuration locked: {0}")]
    ConfigLocked(String),

    /// New job creation is paused
    #[error("Job intake is paused")]
    IntakePaused,

    /// Completion/validation/finalization/withdrawal are paused
    #[error("Settlement is paused")]
    SettlementPaused,
}

impl From<anyhow::Error> for MarketError {
    fn from(err: anyhow::Error) -> Self {
        MarketError::TransferFailed(err.to_string())
    }
}
