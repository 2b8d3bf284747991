use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_owner, AppState, OwnerQuery};
use crate::db::StoredSession;
use crate::domain::{Candle, Decimal, Position, Side, TimeMs};
use crate::engine::{CloseOutcome, NextDayOutcome, SessionStatus};
use crate::error::AppError;

/// What a player is allowed to see of a session. Candles past the reveal
/// index are never included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub owner_id: String,
    pub version: i64,
    pub status: SessionStatus,
    pub balance: Decimal,
    pub starting_balance: Decimal,
    pub realized_pnl_total: Decimal,
    pub next_day_uses_remaining: u32,
    pub reveal_index: usize,
    pub candle_count: usize,
    pub current_price: Decimal,
    pub position: Option<Position>,
    pub liquidated: bool,
    pub ended: bool,
    pub started_at: TimeMs,
    pub candles: Vec<Candle>,
}

impl From<&StoredSession> for SessionView {
    fn from(stored: &StoredSession) -> Self {
        let s = &stored.session;
        Self {
            session_id: s.session_id().to_string(),
            owner_id: s.owner_id().to_string(),
            version: stored.version,
            status: s.status(),
            balance: s.balance(),
            starting_balance: s.starting_balance(),
            realized_pnl_total: s.realized_pnl_total(),
            next_day_uses_remaining: s.next_day_uses_remaining(),
            reveal_index: s.reveal_index(),
            candle_count: s.candle_count(),
            current_price: s.current_price(),
            position: s.position().cloned(),
            liquidated: s.is_liquidated(),
            ended: s.is_ended(),
            started_at: s.started_at(),
            candles: s.visible_candles().cloned().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse<T: Serialize> {
    pub result: T,
    pub session: SessionView,
}

impl<T: Serialize> ActionResponse<T> {
    fn new(result: T, stored: &StoredSession) -> Json<Self> {
        Json(Self {
            result,
            session: stored.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub owner: String,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    pub owner: String,
    pub side: Side,
    pub leverage: u32,
    pub margin_pct: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleInRequest {
    pub owner: String,
    pub side: Side,
    pub margin_pct: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    pub owner: String,
    pub percent: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRequest {
    pub owner: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartResponse {
    pub tokens_left: i64,
    pub session: SessionView,
}

pub async fn get_game(
    Query(params): Query<OwnerQuery>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, AppError> {
    let owner = parse_owner(&params.owner)?;
    let stored = state.game.get(&owner).await?;
    Ok(Json((&stored).into()))
}

pub async fn start_game(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<SessionView>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let stored = state.game.start(&owner, req.seed).await?;
    Ok(Json((&stored).into()))
}

pub async fn open_position(
    State(state): State<AppState>,
    Json(req): Json<OpenRequest>,
) -> Result<Json<ActionResponse<Position>>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let (position, stored) = state
        .game
        .open(&owner, req.side, req.leverage, req.margin_pct)
        .await?;
    Ok(ActionResponse::new(position, &stored))
}

pub async fn scale_in(
    State(state): State<AppState>,
    Json(req): Json<ScaleInRequest>,
) -> Result<Json<ActionResponse<Position>>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let (position, stored) = state.game.scale_in(&owner, req.side, req.margin_pct).await?;
    Ok(ActionResponse::new(position, &stored))
}

pub async fn close_position(
    State(state): State<AppState>,
    Json(req): Json<CloseRequest>,
) -> Result<Json<ActionResponse<CloseOutcome>>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let (outcome, stored) = state.game.close(&owner, req.percent).await?;
    Ok(ActionResponse::new(outcome, &stored))
}

pub async fn next_day(
    State(state): State<AppState>,
    Json(req): Json<OwnerRequest>,
) -> Result<Json<ActionResponse<NextDayOutcome>>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let (outcome, stored) = state.game.next_day(&owner).await?;
    Ok(ActionResponse::new(outcome, &stored))
}

pub async fn restart_game(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<RestartResponse>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let restarted = state.game.restart(&owner, req.seed).await?;
    Ok(Json(RestartResponse {
        tokens_left: restarted.tokens_left,
        session: (&restarted.stored).into(),
    }))
}
