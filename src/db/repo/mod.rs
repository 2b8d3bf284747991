//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct, the ledger store behind the
//! game. Methods are organized across submodules by domain:
//! - `sessions.rs` - versioned game session rows
//! - `tokens.rs` - token accounts and the audit trail
//! - `referrals.rs` - referral rows and their paired grants

mod referrals;
mod sessions;
mod tokens;

use crate::engine::GameSession;
use sqlx::sqlite::SqlitePool;

/// A persisted session plus the version used for compare-and-set writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub version: i64,
    pub session: GameSession,
}

/// Outcome of the combined "consume a token and replace the session" write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartWrite {
    Committed { tokens_left: i64, version: i64 },
    InsufficientTokens,
    /// The session row changed since it was read.
    Conflict,
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Cheap liveness probe for `/ready`.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
