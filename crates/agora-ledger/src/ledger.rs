use agora_types::AgiAmount;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// The four lock categories tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockClass {
    Escrow,
    AgentBond,
    ValidatorBond,
    DisputeBond,
}

#[derive(Debug, Clone, Copy, Default)]
struct LedgerState {
    token_balance: AgiAmount,
    locked_escrow: AgiAmount,
    locked_agent_bonds: AgiAmount,
    locked_validator_bonds: AgiAmount,
    locked_dispute_bonds: AgiAmount,
}

/// Consistent copy of the ledger counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub token_balance: AgiAmount,
    pub locked_escrow: AgiAmount,
    pub locked_agent_bonds: AgiAmount,
    pub locked_validator_bonds: AgiAmount,
    pub locked_dispute_bonds: AgiAmount,
}

impl LedgerSnapshot {
    pub fn total_locked(&self) -> AgiAmount {
        self.locked_escrow
            .saturating_add(self.locked_agent_bonds)
            .saturating_add(self.locked_validator_bonds)
            .saturating_add(self.locked_dispute_bonds)
    }

    pub fn withdrawable(&self) -> AgiAmount {
        self.token_balance.saturating_sub(self.total_locked())
    }

    pub fn is_solvent(&self) -> bool {
        self.token_balance >= self.total_locked()
    }
}

/// Process-wide escrow/bond accounting aggregate.
pub struct EscrowLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl Default for EscrowLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
        }
    }

    /// Funds enter the engine and are locked in one step.
    pub async fn collect(&self, class: LockClass, amount: AgiAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        let new_balance = match state.token_balance.checked_add(amount) {
            Some(b) => b,
            None => bail!("token balance overflow collecting {}", amount),
        };
        state.token_balance = new_balance;
        let lock = lock_of(&mut state, class);
        *lock = lock.saturating_add(amount);
        info!(
            class = ?class,
            amount = amount.to_agi(),
            balance = state.token_balance.to_agi(),
            "🔒 Funds collected and locked"
        );
        Ok(())
    }

    /// Unlock and pay out to a counterparty: the lock and the balance both
    /// decrease by `amount`.
    pub async fn release_to_party(&self, class: LockClass, amount: AgiAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        self.unlock(&mut state, class, amount)?;
        // The lock decreased first, so the balance cannot go below the
        // remaining locked total here.
        state.token_balance = match state.token_balance.checked_sub(amount) {
            Some(b) => b,
            None => bail!("token balance underflow paying out {}", amount),
        };
        info!(
            class = ?class,
            amount = amount.to_agi(),
            balance = state.token_balance.to_agi(),
            "💸 Locked funds paid out"
        );
        Ok(())
    }

    /// Unlock but keep the value inside the engine as treasury surplus
    /// (slashes and forfeits).
    pub async fn release_to_surplus(&self, class: LockClass, amount: AgiAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        self.unlock(&mut state, class, amount)?;
        info!(
            class = ?class,
            amount = amount.to_agi(),
            "⚖️ Locked funds forfeited to surplus"
        );
        Ok(())
    }

    /// Withdraw unobligated surplus. The settlement-pause precondition is
    /// enforced by the market layer; this only guards the amount.
    pub async fn withdraw_surplus(&self, amount: AgiAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        let snapshot = snapshot_of(&state);
        if amount > snapshot.withdrawable() {
            bail!(
                "withdrawal {} exceeds withdrawable surplus {}",
                amount,
                snapshot.withdrawable()
            );
        }
        state.token_balance = state.token_balance.saturating_sub(amount);
        info!(
            amount = amount.to_agi(),
            balance = state.token_balance.to_agi(),
            "💰 Surplus withdrawn"
        );
        Ok(())
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read().await;
        snapshot_of(&state)
    }

    pub async fn withdrawable(&self) -> AgiAmount {
        self.snapshot().await.withdrawable()
    }

    pub async fn total_locked(&self) -> AgiAmount {
        self.snapshot().await.total_locked()
    }

    fn unlock(&self, state: &mut LedgerState, class: LockClass, amount: AgiAmount) -> Result<()> {
        let lock = lock_of(state, class);
        match lock.checked_sub(amount) {
            Some(remaining) => {
                *lock = remaining;
                Ok(())
            }
            None => bail!(
                "insufficient locked {:?}: has {}, releasing {}",
                class,
                lock,
                amount
            ),
        }
    }
}

fn lock_of(state: &mut LedgerState, class: LockClass) -> &mut AgiAmount {
    match class {
        LockClass::Escrow => &mut state.locked_escrow,
        LockClass::AgentBond => &mut state.locked_agent_bonds,
        LockClass::ValidatorBond => &mut state.locked_validator_bonds,
        LockClass::DisputeBond => &mut state.locked_dispute_bonds,
    }
}

fn snapshot_of(state: &LedgerState) -> LedgerSnapshot {
    LedgerSnapshot {
        token_balance: state.token_balance,
        locked_escrow: state.locked_escrow,
        locked_agent_bonds: state.locked_agent_bonds,
        locked_validator_bonds: state.locked_validator_bonds,
        locked_dispute_bonds: state.locked_dispute_bonds,
    }
}
