pub mod game;
pub mod health;
pub mod referrals;
pub mod tokens;

use crate::config::Config;
use crate::datasource::MarketDataProvider;
use crate::db::Repository;
use crate::domain::OwnerId;
use crate::error::AppError;
use crate::orchestration::{GameService, ReferralDispatcher, TokenLedger};
use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub game: Arc<GameService>,
    pub ledger: TokenLedger,
    pub referrals: ReferralDispatcher,
}

impl AppState {
    /// Wire the services over one repository and market data source.
    pub fn new(repo: Arc<Repository>, config: Config, market: Arc<dyn MarketDataProvider>) -> Self {
        let ledger = TokenLedger::new(
            repo.clone(),
            config.default_retry_tokens,
            config.daily_token_floor,
        );
        let game = Arc::new(GameService::new(
            repo.clone(),
            market,
            ledger.clone(),
            config.rules(),
        ));
        let referrals = ReferralDispatcher::new(repo.clone(), ledger.clone(), config.referral_reward);
        Self {
            repo,
            config,
            game,
            ledger,
            referrals,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

pub(crate) fn parse_owner(raw: &str) -> Result<OwnerId, AppError> {
    Ok(OwnerId::from_str(raw)?)
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/game", get(game::get_game))
        .route("/v1/game/start", post(game::start_game))
        .route("/v1/game/open", post(game::open_position))
        .route("/v1/game/scale-in", post(game::scale_in))
        .route("/v1/game/close", post(game::close_position))
        .route("/v1/game/next-day", post(game::next_day))
        .route("/v1/game/restart", post(game::restart_game))
        .route("/v1/tokens", get(tokens::get_tokens))
        .route("/v1/tokens/events", get(tokens::get_token_events))
        .route("/v1/tokens/ad-watch", post(tokens::ad_watch))
        .route("/v1/tokens/daily", post(tokens::claim_daily))
        .route("/v1/referrals/code", get(referrals::get_code))
        .route("/v1/referrals/redeem", post(referrals::redeem))
        .layer(cors)
        .with_state(state)
}
