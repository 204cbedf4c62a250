//! Escrow and bond ledger for the Agora settlement engine.
//!
//! The ledger is a single process-wide aggregate: the engine's token balance
//! plus four locked counters (escrow, agent bonds, validator bonds, dispute
//! bonds). Every value-moving transition updates a counter and the balance
//! under one write lock, so the solvency invariant
//! `token_balance >= sum(locked)` holds after every operation and is never
//! reconstructed by scanning jobs.

pub mod ledger;

pub use ledger::{EscrowLedger, LedgerSnapshot, LockClass};
