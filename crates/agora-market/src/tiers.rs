//! Payout-tier resolution. An admin-registered table maps external
//! non-fungible credential types to payout percentages; the highest tier an
//! agent currently holds is read exactly once, at assignment, and
//! snapshotted into the job.

use agora_types::AccountAddress;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// External tier-credential registry. Implementations must fail closed: a
/// broken or disabled credential check reads as "not held", never as an
/// error that reverts the caller.
#[async_trait]
pub trait CredentialOracle: Send + Sync {
    async fn owns_enabled_credential(&self, agent: AccountAddress, credential_type: u64) -> bool;
}

/// In-memory credential holdings, used in tests and standalone deployments.
pub struct StaticCredentials {
    held: Arc<RwLock<HashSet<(AccountAddress, u64)>>>,
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self {
            held: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn grant(&self, agent: AccountAddress, credential_type: u64) {
        self.held.write().await.insert((agent, credential_type));
    }

    pub async fn revoke(&self, agent: AccountAddress, credential_type: u64) {
        self.held.write().await.remove(&(agent, credential_type));
    }
}

#[async_trait]
impl CredentialOracle for StaticCredentials {
    async fn owns_enabled_credential(&self, agent: AccountAddress, credential_type: u64) -> bool {
        self.held.read().await.contains(&(agent, credential_type))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierEntry {
    pub payout_pct: u8,
    pub enabled: bool,
}

struct TierState {
    tiers: HashMap<u64, TierEntry>,
    allowlist: HashSet<AccountAddress>,
}

/// Registered tier table plus the agent allow-list fallback.
pub struct PayoutTierRegistry {
    state: Arc<RwLock<TierState>>,
    oracle: Arc<dyn CredentialOracle>,
}

impl PayoutTierRegistry {
    pub fn new(oracle: Arc<dyn CredentialOracle>) -> Self {
        Self {
            state: Arc::new(RwLock::new(TierState {
                tiers: HashMap::new(),
                allowlist: HashSet::new(),
            })),
            oracle,
        }
    }

    /// Register or replace a tier. Percentage bounds against the reward pool
    /// are enforced by the registry owner before calling in.
    pub async fn set_tier(&self, credential_type: u64, payout_pct: u8, enabled: bool) {
        self.state.write().await.tiers.insert(
            credential_type,
            TierEntry {
                payout_pct,
                enabled,
            },
        );
    }

    pub async fn tier(&self, credential_type: u64) -> Option<TierEntry> {
        self.state.read().await.tiers.get(&credential_type).copied()
    }

    /// Highest payout percentage among enabled tiers, independent of any
    /// agent's holdings. Parameter changes check this against the new
    /// reward pool.
    pub async fn max_enabled_pct(&self) -> u8 {
        self.state
            .read()
            .await
            .tiers
            .values()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.payout_pct)
            .max()
            .unwrap_or(0)
    }

    pub async fn set_allowlisted(&self, agent: AccountAddress, allowed: bool) {
        let mut state = self.state.write().await;
        if allowed {
            state.allowlist.insert(agent);
        } else {
            state.allowlist.remove(&agent);
        }
    }

    pub async fn is_allowlisted(&self, agent: AccountAddress) -> bool {
        self.state.read().await.allowlist.contains(&agent)
    }

    /// Highest payout percentage among registered, enabled tiers whose
    /// credential the agent currently holds; `default_pct` for allow-listed
    /// agents holding none; otherwise zero.
    pub async fn resolve(&self, agent: AccountAddress, default_pct: u8) -> u8 {
        let (candidates, allowlisted) = {
            let state = self.state.read().await;
            let candidates: Vec<(u64, u8)> = state
                .tiers
                .iter()
                .filter(|(_, entry)| entry.enabled)
                .map(|(ctype, entry)| (*ctype, entry.payout_pct))
                .collect();
            (candidates, state.allowlist.contains(&agent))
        };

        let mut best = 0u8;
        for (ctype, pct) in candidates {
            if pct > best && self.oracle.owns_enabled_credential(agent, ctype).await {
                best = pct;
            }
        }

        if best == 0 && allowlisted {
            best = default_pct;
        }

        debug!(agent = %agent, pct = best, "Payout tier resolved");
        best
    }
}
