//! Ledger store backed by SQLite.
//!
//! - schema and pragmas (`migrations`)
//! - the `Repository` for sessions, token accounts and referrals

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{Repository, RestartWrite, StoredSession};
