use crate::datasource::{DataSourceError, MarketDataProvider};
use crate::db::{Repository, RestartWrite, StoredSession};
use crate::domain::{Decimal, OwnerId, Position, Side, TokenReason};
use crate::engine::{CloseOutcome, EngineError, GameRules, GameSession, NextDayOutcome};
use crate::orchestration::ledger::{LedgerError, TokenLedger};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

/// Drives persisted game sessions.
///
/// Operations for one owner are serialized by a per-owner async lock held
/// across load, transition and write. Different owners never wait on each
/// other. Transitions run on an in-memory copy, so a dropped future commits
/// nothing.
pub struct GameService {
    repo: Arc<Repository>,
    market: Arc<dyn MarketDataProvider>,
    ledger: TokenLedger,
    rules: GameRules,
    locks: Mutex<HashMap<OwnerId, Arc<tokio::sync::Mutex<()>>>>,
}

/// A committed restart.
#[derive(Debug, Clone)]
pub struct Restarted {
    pub stored: StoredSession,
    pub tokens_left: i64,
}

#[derive(Debug, Error)]
pub enum GameServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("No game session for this owner")]
    NoSession,
    #[error("Session was modified concurrently, retry")]
    Conflict,
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl From<DataSourceError> for GameServiceError {
    fn from(err: DataSourceError) -> Self {
        GameServiceError::CollaboratorUnavailable(format!("market data: {}", err))
    }
}

impl GameService {
    pub fn new(
        repo: Arc<Repository>,
        market: Arc<dyn MarketDataProvider>,
        ledger: TokenLedger,
        rules: GameRules,
    ) -> Self {
        Self {
            repo,
            market,
            ledger,
            rules,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    fn owner_lock(&self, owner: &OwnerId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // drop entries nobody is holding or waiting on
        if locks.len() > 1024 {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(owner.clone()).or_default().clone()
    }

    async fn fresh_candles(&self, seed: Option<u64>) -> Result<Vec<crate::domain::Candle>, GameServiceError> {
        Ok(self.market.fetch_candles(seed).await?)
    }

    fn unusable_data(err: EngineError) -> GameServiceError {
        GameServiceError::CollaboratorUnavailable(format!("market data unusable: {}", err))
    }

    /// Create the owner's first session, or return the one that exists.
    /// Starting is free; only restarts cost a token.
    pub async fn start(&self, owner: &OwnerId, seed: Option<u64>) -> Result<StoredSession, GameServiceError> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        if let Some(stored) = self.repo.load_session(owner).await? {
            return Ok(stored);
        }

        self.ledger.account(owner).await?;
        let candles = self.fresh_candles(seed).await?;
        let session =
            GameSession::start(owner.clone(), candles, &self.rules).map_err(Self::unusable_data)?;

        if !self.repo.insert_session(&session).await? {
            warn!(owner = %owner, "Session appeared during start, returning stored one");
            return self.repo.load_session(owner).await?.ok_or(GameServiceError::Conflict);
        }
        info!(
            owner = %owner,
            session_id = %session.session_id(),
            uses = session.next_day_uses_remaining(),
            candles = session.candle_count(),
            "Game started"
        );
        Ok(StoredSession {
            version: 1,
            session,
        })
    }

    pub async fn get(&self, owner: &OwnerId) -> Result<StoredSession, GameServiceError> {
        self.repo
            .load_session(owner)
            .await?
            .ok_or(GameServiceError::NoSession)
    }

    /// Load, apply one transition, and compare-and-set the result.
    async fn apply<T>(
        &self,
        owner: &OwnerId,
        transition: impl FnOnce(&mut GameSession) -> Result<T, EngineError>,
    ) -> Result<(T, StoredSession), GameServiceError> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        let StoredSession {
            version,
            mut session,
        } = self.get(owner).await?;
        let out = transition(&mut session)?;
        let version = self
            .repo
            .update_session(&session, version)
            .await?
            .ok_or(GameServiceError::Conflict)?;
        Ok((out, StoredSession { version, session }))
    }

    pub async fn open(
        &self,
        owner: &OwnerId,
        side: Side,
        leverage: u32,
        margin_pct: Decimal,
    ) -> Result<(Position, StoredSession), GameServiceError> {
        self.apply(owner, |s| s.open_position(side, leverage, margin_pct))
            .await
    }

    pub async fn scale_in(
        &self,
        owner: &OwnerId,
        side: Side,
        margin_pct: Decimal,
    ) -> Result<(Position, StoredSession), GameServiceError> {
        self.apply(owner, |s| s.scale_in(side, margin_pct)).await
    }

    pub async fn close(
        &self,
        owner: &OwnerId,
        percent: Decimal,
    ) -> Result<(CloseOutcome, StoredSession), GameServiceError> {
        self.apply(owner, |s| s.close_position(percent)).await
    }

    pub async fn next_day(
        &self,
        owner: &OwnerId,
    ) -> Result<(NextDayOutcome, StoredSession), GameServiceError> {
        self.apply(owner, GameSession::next_day).await
    }

    /// Spend one retry token and replace the session with a fresh round.
    ///
    /// The token and the session change together or not at all.
    pub async fn restart(&self, owner: &OwnerId, seed: Option<u64>) -> Result<Restarted, GameServiceError> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        let current = self.get(owner).await?;
        let account = self.ledger.account(owner).await?;
        if account.retry_tokens <= 0 {
            return Err(LedgerError::InsufficientTokens.into());
        }

        let candles = self.fresh_candles(seed).await?;
        let next = current
            .session
            .restart(candles, &self.rules)
            .map_err(Self::unusable_data)?;

        match self
            .repo
            .replace_session_with_token(&next, current.version)
            .await?
        {
            RestartWrite::Committed {
                tokens_left,
                version,
            } => {
                self.ledger
                    .note_consumed(owner, TokenReason::RestartConsumption, tokens_left);
                info!(
                    owner = %owner,
                    previous_session = %current.session.session_id(),
                    session_id = %next.session_id(),
                    balance = %next.balance(),
                    tokens_left,
                    "Game restarted"
                );
                Ok(Restarted {
                    stored: StoredSession {
                        version,
                        session: next,
                    },
                    tokens_left,
                })
            }
            RestartWrite::InsufficientTokens => Err(LedgerError::InsufficientTokens.into()),
            RestartWrite::Conflict => Err(GameServiceError::Conflict),
        }
    }
}
