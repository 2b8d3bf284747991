//! Referral rows and the paired grants they trigger.

use crate::domain::{OwnerId, Referral, TimeMs, TokenReason};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

use super::tokens::apply_delta;
use super::Repository;

impl Repository {
    /// Record a referral and grant `reward` to both sides in one transaction.
    ///
    /// Returns false (and writes nothing) if the referee was already referred.
    /// Both token accounts must exist.
    pub async fn record_referral_with_grants(
        &self,
        referral: &Referral,
        reward: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO referrals (referee_id, referrer_id, code, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(referee_id) DO NOTHING
            "#,
        )
        .bind(referral.referee_id.as_str())
        .bind(referral.referrer_id.as_str())
        .bind(&referral.code)
        .bind(referral.created_at.as_ms())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            debug!(referee = %referral.referee_id, "Referral already recorded");
            return Ok(false);
        }

        apply_delta(&mut *tx, &referral.referrer_id, reward, TokenReason::ReferralReward)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        apply_delta(&mut *tx, &referral.referee_id, reward, TokenReason::ReferralSignup)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        tx.commit().await?;
        Ok(true)
    }

    /// The referral recorded for a referee, if any.
    pub async fn get_referral(&self, referee: &OwnerId) -> Result<Option<Referral>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT referee_id, referrer_id, code, created_at FROM referrals WHERE referee_id = ?",
        )
        .bind(referee.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let referrer: String = r.get("referrer_id");
            let referrer_id =
                OwnerId::from_str(&referrer).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            Ok(Referral {
                referrer_id,
                referee_id: referee.clone(),
                code: r.get("code"),
                created_at: TimeMs::new(r.get("created_at")),
            })
        })
        .transpose()
    }
}
