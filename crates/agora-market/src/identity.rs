//! Pluggable identity authorization. The engine consumes eligibility as a
//! single boolean question with a fail-closed contract: any internal error
//! in an implementation must surface as `false`, never as a panic or an
//! error that could abort the caller's transition.

use agora_types::{AccountAddress, Role};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// External identity/eligibility oracle.
#[async_trait]
pub trait IdentityOracle: Send + Sync {
    /// Is `caller` authorized to act in `role` on `job_id`? `label` and
    /// `proof` are opaque evidence forwarded from the caller (a domain
    /// label and its ownership proof, a Merkle path, etc.).
    async fn is_authorized(
        &self,
        role: Role,
        job_id: u64,
        caller: AccountAddress,
        label: &str,
        proof: &[u8],
    ) -> bool;
}

/// Authorizes every caller for every role. Development and test variant.
pub struct OpenIdentity;

#[async_trait]
impl IdentityOracle for OpenIdentity {
    async fn is_authorized(
        &self,
        _role: Role,
        _job_id: u64,
        _caller: AccountAddress,
        _label: &str,
        _proof: &[u8],
    ) -> bool {
        true
    }
}

/// Denies every caller. Used to switch a role off entirely.
pub struct DisabledIdentity;

#[async_trait]
impl IdentityOracle for DisabledIdentity {
    async fn is_authorized(
        &self,
        _role: Role,
        _job_id: u64,
        _caller: AccountAddress,
        _label: &str,
        _proof: &[u8],
    ) -> bool {
        false
    }
}

/// Administrative per-role allowlists.
pub struct AllowlistIdentity {
    allowed: Arc<RwLock<HashMap<Role, HashSet<AccountAddress>>>>,
}

impl Default for AllowlistIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl AllowlistIdentity {
    pub fn new() -> Self {
        Self {
            allowed: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn allow(&self, role: Role, account: AccountAddress) {
        self.allowed
            .write()
            .await
            .entry(role)
            .or_default()
            .insert(account);
    }

    pub async fn revoke(&self, role: Role, account: AccountAddress) {
        if let Some(set) = self.allowed.write().await.get_mut(&role) {
            set.remove(&account);
        }
    }
}

#[async_trait]
impl IdentityOracle for AllowlistIdentity {
    async fn is_authorized(
        &self,
        role: Role,
        _job_id: u64,
        caller: AccountAddress,
        _label: &str,
        _proof: &[u8],
    ) -> bool {
        self.allowed
            .read()
            .await
            .get(&role)
            .map(|set| set.contains(&caller))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allowlist_grants_and_revokes() {
        let oracle = AllowlistIdentity::new();
        let agent = AccountAddress::from_bytes([7; 32]);

        assert!(!oracle.is_authorized(Role::Agent, 1, agent, "", &[]).await);

        oracle.allow(Role::Agent, agent).await;
        assert!(oracle.is_authorized(Role::Agent, 1, agent, "", &[]).await);
        // Role scoping: the grant does not leak into other roles.
        assert!(!oracle.is_authorized(Role::Validator, 1, agent, "", &[]).await);

        oracle.revoke(Role::Agent, agent).await;
        assert!(!oracle.is_authorized(Role::Agent, 1, agent, "", &[]).await);
    }

    #[tokio::test]
    async fn test_fixed_variants() {
        let caller = AccountAddress::from_bytes([9; 32]);
        assert!(OpenIdentity.is_authorized(Role::Moderator, 3, caller, "", &[]).await);
        assert!(!DisabledIdentity.is_authorized(Role::Moderator, 3, caller, "", &[]).await);
    }
}
