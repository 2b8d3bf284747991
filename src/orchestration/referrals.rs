use crate::db::Repository;
use crate::domain::referral::REFERRAL_CODE_LEN;
use crate::domain::{normalize_code, OwnerId, Referral, TimeMs};
use crate::orchestration::ledger::{LedgerError, TokenLedger};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Validates referral codes against the account registry and pays out the
/// symmetric reward exactly once per referee.
#[derive(Clone)]
pub struct ReferralDispatcher {
    repo: Arc<Repository>,
    ledger: TokenLedger,
    reward: i64,
}

#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("Unknown referral code")]
    InvalidCode,
    #[error("Cannot redeem your own referral code")]
    SelfReferral,
    #[error("Already referred")]
    AlreadyReferred,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl ReferralDispatcher {
    pub fn new(repo: Arc<Repository>, ledger: TokenLedger, reward: i64) -> Self {
        Self {
            repo,
            ledger,
            reward,
        }
    }

    /// The owner's code. Codes are only ever issued with the account.
    pub async fn issue_code(&self, owner: &OwnerId) -> Result<String, ReferralError> {
        Ok(self.ledger.account(owner).await?.referral_code)
    }

    pub async fn redeem(&self, referee: &OwnerId, code: &str) -> Result<Referral, ReferralError> {
        let code = normalize_code(code);
        if code.len() != REFERRAL_CODE_LEN || !code.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ReferralError::InvalidCode);
        }

        let referrer = self
            .repo
            .find_owner_by_referral_code(&code)
            .await?
            .ok_or(ReferralError::InvalidCode)?;
        if &referrer == referee {
            return Err(ReferralError::SelfReferral);
        }
        if self.repo.get_referral(referee).await?.is_some() {
            return Err(ReferralError::AlreadyReferred);
        }

        self.ledger.account(referee).await?;
        let referral = Referral {
            referrer_id: referrer,
            referee_id: referee.clone(),
            code,
            created_at: TimeMs::now(),
        };
        // the insert is the real uniqueness check; the lookup above only
        // avoids creating accounts for repeat attempts
        if !self
            .repo
            .record_referral_with_grants(&referral, self.reward)
            .await?
        {
            return Err(ReferralError::AlreadyReferred);
        }

        info!(
            referrer = %referral.referrer_id,
            referee = %referral.referee_id,
            reward = self.reward,
            "Referral redeemed"
        );
        Ok(referral)
    }
}
