use crate::db::Repository;
use crate::domain::{OwnerId, TokenAccount, TokenEvent, TokenReason};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Retry token ledger. Every balance change is a single atomic store write
/// with an audit event; there is no "set balance" operation.
#[derive(Clone)]
pub struct TokenLedger {
    repo: Arc<Repository>,
    signup_bonus: i64,
    daily_floor: i64,
}

/// Result of a daily top-up claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyClaim {
    pub granted: i64,
    pub retry_tokens: i64,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("No retry tokens left")]
    InsufficientTokens,
    #[error("Ad view was not confirmed")]
    AdNotConfirmed,
    #[error("Daily tokens already claimed for {0}")]
    DailyAlreadyClaimed(NaiveDate),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl TokenLedger {
    pub fn new(repo: Arc<Repository>, signup_bonus: i64, daily_floor: i64) -> Self {
        Self {
            repo,
            signup_bonus,
            daily_floor,
        }
    }

    /// The owner's account, created with the signup bonus on first access.
    pub async fn account(&self, owner: &OwnerId) -> Result<TokenAccount, LedgerError> {
        let (account, created) = self
            .repo
            .ensure_token_account(owner, self.signup_bonus)
            .await?;
        if created {
            info!(
                owner = %owner,
                bonus = self.signup_bonus,
                referral_code = %account.referral_code,
                "Token account created"
            );
        }
        Ok(account)
    }

    /// Add `amount` (> 0) tokens. Returns the new balance.
    pub async fn grant(
        &self,
        owner: &OwnerId,
        amount: i64,
        reason: TokenReason,
    ) -> Result<i64, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidParameter(format!(
                "grant amount must be positive, got {}",
                amount
            )));
        }
        if reason == TokenReason::RestartConsumption {
            return Err(LedgerError::InvalidParameter(
                "restart_consumption is not a grant reason".to_string(),
            ));
        }
        self.account(owner).await?;
        let balance = self
            .repo
            .grant_tokens(owner, amount, reason)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        info!(owner = %owner, amount, reason = %reason, balance, "Tokens granted");
        Ok(balance)
    }

    /// Take one token. Rejected, never clamped, when the balance is zero.
    pub async fn consume(&self, owner: &OwnerId, reason: TokenReason) -> Result<i64, LedgerError> {
        self.account(owner).await?;
        let balance = self
            .repo
            .consume_token(owner, reason)
            .await?
            .ok_or(LedgerError::InsufficientTokens)?;
        self.note_consumed(owner, reason, balance);
        Ok(balance)
    }

    /// Log a committed consume. Restarts consume inside their own store
    /// transaction and report through here too.
    pub(crate) fn note_consumed(&self, owner: &OwnerId, reason: TokenReason, balance: i64) {
        info!(owner = %owner, reason = %reason, balance, "Token consumed");
    }

    /// One confirmed ad view grants exactly one token.
    pub async fn record_ad_watch(&self, owner: &OwnerId, ad_watched: bool) -> Result<i64, LedgerError> {
        if !ad_watched {
            return Err(LedgerError::AdNotConfirmed);
        }
        self.grant(owner, 1, TokenReason::AdWatch).await
    }

    /// Top the balance back up to the daily floor, once per UTC day.
    pub async fn claim_daily(&self, owner: &OwnerId, today: NaiveDate) -> Result<DailyClaim, LedgerError> {
        self.account(owner).await?;
        let granted = self
            .repo
            .claim_daily_reset(owner, today, self.daily_floor)
            .await?
            .ok_or(LedgerError::DailyAlreadyClaimed(today))?;
        let account = self.account(owner).await?;
        info!(owner = %owner, granted, balance = account.retry_tokens, "Daily tokens claimed");
        Ok(DailyClaim {
            granted,
            retry_tokens: account.retry_tokens,
        })
    }

    /// Audit trail, newest first.
    pub async fn events(&self, owner: &OwnerId, limit: i64) -> Result<Vec<TokenEvent>, LedgerError> {
        Ok(self.repo.list_token_events(owner, limit.clamp(1, 500)).await?)
    }
}
