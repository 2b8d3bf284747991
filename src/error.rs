use crate::domain::OwnerIdParseError;
use crate::engine::EngineError;
use crate::orchestration::{GameServiceError, LedgerError, ReferralError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
                AppError::Internal(format!("corrupt ledger row: {}", err))
            }
            _ => AppError::Unavailable(format!("ledger store: {}", err)),
        }
    }
}

impl From<OwnerIdParseError> for AppError {
    fn from(err: OwnerIdParseError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidParameter(_)
            | EngineError::DirectionMismatch { .. }
            | EngineError::NotInProfit { .. }
            | EngineError::InsufficientMargin { .. } => AppError::BadRequest(err.to_string()),
            EngineError::PositionAlreadyOpen
            | EngineError::NoPosition
            | EngineError::NoUsesRemaining
            | EngineError::GameOver => AppError::Conflict(err.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidParameter(_) | LedgerError::AdNotConfirmed => {
                AppError::BadRequest(err.to_string())
            }
            LedgerError::InsufficientTokens | LedgerError::DailyAlreadyClaimed(_) => {
                AppError::Conflict(err.to_string())
            }
            LedgerError::Store(e) => e.into(),
        }
    }
}

impl From<ReferralError> for AppError {
    fn from(err: ReferralError) -> Self {
        match err {
            ReferralError::InvalidCode => AppError::NotFound(err.to_string()),
            ReferralError::SelfReferral => AppError::BadRequest(err.to_string()),
            ReferralError::AlreadyReferred => AppError::Conflict(err.to_string()),
            ReferralError::Ledger(e) => e.into(),
            ReferralError::Store(e) => e.into(),
        }
    }
}

impl From<GameServiceError> for AppError {
    fn from(err: GameServiceError) -> Self {
        match err {
            GameServiceError::Engine(e) => e.into(),
            GameServiceError::Ledger(e) => e.into(),
            GameServiceError::NoSession => AppError::NotFound(err.to_string()),
            GameServiceError::Conflict => AppError::Conflict(err.to_string()),
            GameServiceError::CollaboratorUnavailable(msg) => AppError::Unavailable(msg),
            GameServiceError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "Collaborator unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;

    fn status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_engine_errors_map_to_client_statuses() {
        assert_eq!(
            status(EngineError::NotInProfit { pnl: Decimal::ZERO }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(EngineError::GameOver), StatusCode::CONFLICT);
        assert_eq!(status(EngineError::NoUsesRemaining), StatusCode::CONFLICT);
    }

    #[test]
    fn test_collaborator_failures_are_503() {
        assert_eq!(
            status(GameServiceError::CollaboratorUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(LedgerError::Store(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(sqlx::Error::Decode("bad state_json".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(GameServiceError::Store(sqlx::Error::Decode("bad state_json".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(GameServiceError::Store(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_referral_errors() {
        assert_eq!(status(ReferralError::InvalidCode), StatusCode::NOT_FOUND);
        assert_eq!(status(ReferralError::AlreadyReferred), StatusCode::CONFLICT);
        assert_eq!(
            status(GameServiceError::Ledger(LedgerError::InsufficientTokens)),
            StatusCode::CONFLICT
        );
    }
}
