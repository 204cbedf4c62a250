//! # Agora Market
//!
//! An escrow-and-settlement engine for outsourced agent work.
//!
//! ## Overview
//!
//! Employers post jobs with an escrowed payout; credentialed agents take
//! assignments against a posted completion bond; a validator quorum votes on
//! delivered work under its own bonds; disputes escalate to moderators. Every
//! unit of value is held in the [`agora_ledger::EscrowLedger`] under a class
//! of obligation, and every settlement path fully accounts for the escrow
//! and every posted bond.
//!
//! ## Architecture
//!
//! - **Registry**: the job lifecycle state machine and sole writer of
//!   economic state
//! - **Settlement planner**: pure arithmetic producing a
//!   [`settlement::SettlementPlan`] that the registry applies in one pass
//! - **Bond curves**: pure agent and validator bond sizing
//! - **Payout tiers**: credential-backed payout percentages, snapshotted at
//!   assignment
//! - **Oracles**: identity and credential checks consumed as boolean
//!   capabilities that fail closed
//! - **Certificates**: best-effort completion-certificate minting on
//!   agent-win settlements
//!
//! ## Job lifecycle
//!
//! 1. **Open**: payout escrowed, awaiting an agent
//! 2. **Assigned**: agent bonded, clock running
//! 3. **CompletionRequested**: delivery claimed, validators vote
//! 4. **Disputed**: contested, awaiting a moderator ruling
//! 5. Terminal: **SettledAgentWin**, **SettledEmployerWin**, **Expired**

pub mod bond;
pub mod certificate;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod registry;
pub mod reputation;
pub mod settlement;
pub mod tiers;
pub mod types;

pub use bond::{agent_bond, validator_bond};
pub use certificate::{certificate_token_id, CertificateIssuer, RecordingIssuer};
pub use config::ProtocolConfig;
pub use error::{MarketError, Result};
pub use events::{EventLog, JobEvent};
pub use identity::{AllowlistIdentity, DisabledIdentity, IdentityOracle, OpenIdentity};
pub use registry::{JobRegistry, MarketStats};
pub use reputation::{reputation_delta, ReputationBook};
pub use settlement::{plan_expiry, plan_settlement, plan_stale_unwind, SettlementPlan, VoterShare};
pub use tiers::{CredentialOracle, PayoutTierRegistry, StaticCredentials, TierEntry};
pub use types::{
    DisputeOutcome, Job, JobStatus, SettlementOutcome, VoteChoice, VoteRecord,
};
