//! Game session persistence.
//!
//! One row per owner. The full engine state lives in `state_json`; `status`
//! and `balance` are denormalized for inspection. Every update is a
//! compare-and-set on `version`.

use crate::domain::{OwnerId, TokenReason};
use crate::engine::GameSession;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::tokens::apply_delta;
use super::{now_ms, Repository, RestartWrite, StoredSession};

fn encode(session: &GameSession) -> Result<String, sqlx::Error> {
    serde_json::to_string(session).map_err(|e| sqlx::Error::Protocol(format!("encode session: {}", e)))
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredSession, sqlx::Error> {
    let state: String = row.get("state_json");
    let session: GameSession =
        serde_json::from_str(&state).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(StoredSession {
        version: row.get("version"),
        session,
    })
}

impl Repository {
    /// Load the owner's current session, if any.
    pub async fn load_session(&self, owner: &OwnerId) -> Result<Option<StoredSession>, sqlx::Error> {
        let row = sqlx::query("SELECT version, state_json FROM game_sessions WHERE owner_id = ?")
            .bind(owner.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_stored).transpose()
    }

    /// Insert the first session for an owner at version 1.
    ///
    /// Returns false if the owner already has a session.
    pub async fn insert_session(&self, session: &GameSession) -> Result<bool, sqlx::Error> {
        let state = encode(session)?;
        let result = sqlx::query(
            r#"
            INSERT INTO game_sessions (owner_id, session_id, version, status, balance, state_json, updated_at)
            VALUES (?, ?, 1, ?, ?, ?, ?)
            ON CONFLICT(owner_id) DO NOTHING
            "#,
        )
        .bind(session.owner_id().as_str())
        .bind(session.session_id().to_string())
        .bind(session.status().as_str())
        .bind(session.balance().to_canonical_string())
        .bind(state)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the session if its row is still at `expected_version`.
    ///
    /// Returns the new version, or `None` on a version mismatch.
    pub async fn update_session(
        &self,
        session: &GameSession,
        expected_version: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        write_versioned(&mut *conn, session, expected_version).await
    }

    /// Spend one retry token and replace the session in a single transaction.
    pub async fn replace_session_with_token(
        &self,
        session: &GameSession,
        expected_version: i64,
    ) -> Result<RestartWrite, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let Some(tokens_left) =
            apply_delta(&mut *tx, session.owner_id(), -1, TokenReason::RestartConsumption).await?
        else {
            return Ok(RestartWrite::InsufficientTokens);
        };

        let Some(version) = write_versioned(&mut *tx, session, expected_version).await? else {
            debug!(owner = %session.owner_id(), expected_version, "Session changed during restart");
            return Ok(RestartWrite::Conflict);
        };

        tx.commit().await?;
        Ok(RestartWrite::Committed { tokens_left, version })
    }
}

async fn write_versioned(
    conn: &mut sqlx::SqliteConnection,
    session: &GameSession,
    expected_version: i64,
) -> Result<Option<i64>, sqlx::Error> {
    let state = encode(session)?;
    let row = sqlx::query(
        r#"
        UPDATE game_sessions
        SET session_id = ?, version = version + 1, status = ?, balance = ?, state_json = ?, updated_at = ?
        WHERE owner_id = ? AND version = ?
        RETURNING version
        "#,
    )
    .bind(session.session_id().to_string())
    .bind(session.status().as_str())
    .bind(session.balance().to_canonical_string())
    .bind(state)
    .bind(now_ms())
    .bind(session.owner_id().as_str())
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.get("version")))
}
