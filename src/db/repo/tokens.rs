//! Token account and audit trail operations for the repository.
//!
//! All balance changes go through [`apply_delta`], a conditional update that
//! can never drive `retry_tokens` below zero, followed by an audit insert in
//! the same connection (callers hold a transaction).

use crate::domain::{derive_referral_code, OwnerId, TokenAccount, TokenEvent, TokenReason, TimeMs};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use super::{now_ms, Repository};

/// Give up after this many referral-code collisions for one owner.
const MAX_CODE_ATTEMPTS: u32 = 16;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn row_to_account(row: &SqliteRow) -> Result<TokenAccount, sqlx::Error> {
    let owner: String = row.get("owner_id");
    let owner_id = OwnerId::from_str(&owner).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let last_daily_reset: Option<String> = row.get("last_daily_reset");
    let last_daily_reset = last_daily_reset.and_then(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| warn!(owner = %owner, value = %s, error = %e, "Bad last_daily_reset, ignoring"))
            .ok()
    });
    Ok(TokenAccount {
        owner_id,
        retry_tokens: row.get("retry_tokens"),
        referral_code: row.get("referral_code"),
        last_daily_reset,
    })
}

pub(super) async fn fetch_account(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
) -> Result<Option<TokenAccount>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT owner_id, retry_tokens, referral_code, last_daily_reset FROM token_accounts WHERE owner_id = ?",
    )
    .bind(owner.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(row_to_account).transpose()
}

/// Add `delta` to the balance and append an audit event.
///
/// Returns the new balance, or `None` when the account is missing or the
/// change would make the balance negative. Nothing is written in that case.
pub(super) async fn apply_delta(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    delta: i64,
    reason: TokenReason,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE token_accounts
        SET retry_tokens = retry_tokens + ?
        WHERE owner_id = ? AND retry_tokens + ? >= 0
        RETURNING retry_tokens
        "#,
    )
    .bind(delta)
    .bind(owner.as_str())
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let balance_after: i64 = row.get("retry_tokens");

    sqlx::query(
        r#"
        INSERT INTO token_events (owner_id, delta, reason, balance_after, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(owner.as_str())
    .bind(delta)
    .bind(reason.as_str())
    .bind(balance_after)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?;

    Ok(Some(balance_after))
}

/// Create the account (with a fresh referral code and the signup bonus)
/// if it does not exist yet, then read it back.
///
/// The insert runs before any read so a deferred transaction takes the
/// write lock up front and waits on `busy_timeout` instead of failing a
/// read-to-write upgrade.
pub(super) async fn ensure_account(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    signup_bonus: i64,
) -> Result<(TokenAccount, bool), sqlx::Error> {
    for nonce in 0..MAX_CODE_ATTEMPTS {
        let code = derive_referral_code(owner, nonce);
        let inserted = sqlx::query(
            r#"
            INSERT INTO token_accounts (owner_id, retry_tokens, referral_code, last_daily_reset, created_at)
            VALUES (?, 0, ?, NULL, ?)
            ON CONFLICT(owner_id) DO NOTHING
            "#,
        )
        .bind(owner.as_str())
        .bind(&code)
        .bind(now_ms())
        .execute(&mut *conn)
        .await;

        let created = match inserted {
            Ok(result) => result.rows_affected() > 0,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                warn!(owner = %owner, nonce, "Referral code collision, retrying");
                continue;
            }
            Err(e) => return Err(e),
        };

        if created && signup_bonus > 0 {
            apply_delta(conn, owner, signup_bonus, TokenReason::SignupBonus).await?;
        }
        let account = fetch_account(conn, owner)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        return Ok((account, created));
    }

    Err(sqlx::Error::Protocol(format!(
        "could not allocate a referral code for {}",
        owner
    )))
}

impl Repository {
    /// Get the token account for an owner, if it exists.
    pub async fn get_token_account(&self, owner: &OwnerId) -> Result<Option<TokenAccount>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_account(&mut *conn, owner).await
    }

    /// Get or lazily create the token account. The flag is true on creation.
    pub async fn ensure_token_account(
        &self,
        owner: &OwnerId,
        signup_bonus: i64,
    ) -> Result<(TokenAccount, bool), sqlx::Error> {
        if let Some(account) = self.get_token_account(owner).await? {
            return Ok((account, false));
        }
        let mut tx = self.pool.begin().await?;
        let out = ensure_account(&mut *tx, owner, signup_bonus).await?;
        tx.commit().await?;
        Ok(out)
    }

    /// Atomically add `amount` tokens and audit it. Returns the new balance,
    /// or `None` if the account does not exist.
    pub async fn grant_tokens(
        &self,
        owner: &OwnerId,
        amount: i64,
        reason: TokenReason,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let balance = apply_delta(&mut *tx, owner, amount, reason).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Atomically take one token. Returns `None` when the balance is zero
    /// (or the account is missing); nothing is written then.
    pub async fn consume_token(
        &self,
        owner: &OwnerId,
        reason: TokenReason,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let balance = apply_delta(&mut *tx, owner, -1, reason).await?;
        if balance.is_some() {
            tx.commit().await?;
        }
        Ok(balance)
    }

    /// Claim the once-per-day top-up back to `floor` tokens.
    ///
    /// Returns `None` if `day` was already claimed, otherwise the number of
    /// tokens granted (zero when the balance was already at the floor).
    pub async fn claim_daily_reset(
        &self,
        owner: &OwnerId,
        day: NaiveDate,
        floor: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let day = day.format(DATE_FORMAT).to_string();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE token_accounts
            SET last_daily_reset = ?
            WHERE owner_id = ? AND (last_daily_reset IS NULL OR last_daily_reset <> ?)
            RETURNING retry_tokens
            "#,
        )
        .bind(&day)
        .bind(owner.as_str())
        .bind(&day)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let current: i64 = row.get("retry_tokens");
        let top_up = (floor - current).max(0);
        if top_up > 0 {
            apply_delta(&mut *tx, owner, top_up, TokenReason::DailyReset).await?;
        }
        tx.commit().await?;
        Ok(Some(top_up))
    }

    /// Resolve a referral code to its owner.
    pub async fn find_owner_by_referral_code(&self, code: &str) -> Result<Option<OwnerId>, sqlx::Error> {
        let row = sqlx::query("SELECT owner_id FROM token_accounts WHERE referral_code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let owner: String = r.get("owner_id");
            OwnerId::from_str(&owner).map_err(|e| sqlx::Error::Decode(Box::new(e)))
        })
        .transpose()
    }

    /// Most recent audit events first.
    pub async fn list_token_events(
        &self,
        owner: &OwnerId,
        limit: i64,
    ) -> Result<Vec<TokenEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT delta, reason, balance_after, created_at
            FROM token_events
            WHERE owner_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(owner.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let reason_str: String = row.get("reason");
            let Some(reason) = TokenReason::parse(&reason_str) else {
                warn!(owner = %owner, reason = %reason_str, "Unknown token event reason, skipping");
                continue;
            };
            events.push(TokenEvent {
                owner_id: owner.clone(),
                delta: row.get("delta"),
                reason,
                balance_after: row.get("balance_after"),
                created_at: TimeMs::new(row.get("created_at")),
            });
        }
        Ok(events)
    }
}
