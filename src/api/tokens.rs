use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_owner, AppState, OwnerQuery};
use crate::domain::{TokenAccount, TokenEvent};
use crate::error::AppError;

const DEFAULT_EVENT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub owner: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<TokenEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdWatchRequest {
    pub owner: String,
    pub ad_watched: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRequest {
    pub owner: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub retry_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted: Option<i64>,
}

pub async fn get_tokens(
    Query(params): Query<OwnerQuery>,
    State(state): State<AppState>,
) -> Result<Json<TokenAccount>, AppError> {
    let owner = parse_owner(&params.owner)?;
    Ok(Json(state.ledger.account(&owner).await?))
}

pub async fn get_token_events(
    Query(params): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Result<Json<EventsResponse>, AppError> {
    let owner = parse_owner(&params.owner)?;
    let limit = params.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    let events = state.ledger.events(&owner, limit).await?;
    Ok(Json(EventsResponse { events }))
}

pub async fn ad_watch(
    State(state): State<AppState>,
    Json(req): Json<AdWatchRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let retry_tokens = state.ledger.record_ad_watch(&owner, req.ad_watched).await?;
    Ok(Json(BalanceResponse {
        retry_tokens,
        granted: Some(1),
    }))
}

pub async fn claim_daily(
    State(state): State<AppState>,
    Json(req): Json<DailyRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let owner = parse_owner(&req.owner)?;
    let today = chrono::Utc::now().date_naive();
    let claim = state.ledger.claim_daily(&owner, today).await?;
    Ok(Json(BalanceResponse {
        retry_tokens: claim.retry_tokens,
        granted: Some(claim.granted),
    }))
}
