use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_owner, AppState, OwnerQuery};
use crate::domain::Referral;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeResponse {
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub owner: String,
    pub code: String,
}

pub async fn get_code(
    Query(params): Query<OwnerQuery>,
    State(state): State<AppState>,
) -> Result<Json<CodeResponse>, AppError> {
    let owner = parse_owner(&params.owner)?;
    let code = state.referrals.issue_code(&owner).await?;
    Ok(Json(CodeResponse { code }))
}

pub async fn redeem(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<Referral>, AppError> {
    let owner = parse_owner(&req.owner)?;
    Ok(Json(state.referrals.redeem(&owner, &req.code).await?))
}
