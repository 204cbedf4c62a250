//! Completion-certificate issuance. The marketplace that lists and trades
//! certificates lives elsewhere; the engine only asks an issuer to mint one
//! to the employer on an agent-win settlement, and that call is strictly
//! best-effort: a failing issuer is recorded as a diagnostic event and never
//! rolls back the settlement.

use agora_types::AccountAddress;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// External non-fungible certificate issuer.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn mint(&self, owner: AccountAddress, token_id: [u8; 32]) -> anyhow::Result<()>;
}

/// Certificate token id derived from the job identity.
pub fn certificate_token_id(job_id: u64, employer: AccountAddress) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&job_id.to_le_bytes());
    hasher.update(employer.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Issuer that records every mint. Test double and standalone default.
pub struct RecordingIssuer {
    minted: Arc<RwLock<Vec<(AccountAddress, [u8; 32])>>>,
    fail: bool,
}

impl Default for RecordingIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingIssuer {
    pub fn new() -> Self {
        Self {
            minted: Arc::new(RwLock::new(Vec::new())),
            fail: false,
        }
    }

    /// Variant whose mints always fail, for exercising the best-effort
    /// boundary.
    pub fn failing() -> Self {
        Self {
            minted: Arc::new(RwLock::new(Vec::new())),
            fail: true,
        }
    }

    pub async fn minted(&self) -> Vec<(AccountAddress, [u8; 32])> {
        self.minted.read().await.clone()
    }
}

#[async_trait]
impl CertificateIssuer for RecordingIssuer {
    async fn mint(&self, owner: AccountAddress, token_id: [u8; 32]) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("issuer offline");
        }
        self.minted.write().await.push((owner, token_id));
        Ok(())
    }
}
