//! Retry token account and its append-only audit events.

use crate::domain::{OwnerId, TimeMs};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Why a token balance changed. Every balance mutation carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenReason {
    SignupBonus,
    AdWatch,
    ReferralReward,
    ReferralSignup,
    RestartConsumption,
    DailyReset,
    Admin,
}

impl TokenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenReason::SignupBonus => "signup_bonus",
            TokenReason::AdWatch => "ad_watch",
            TokenReason::ReferralReward => "referral_reward",
            TokenReason::ReferralSignup => "referral_signup",
            TokenReason::RestartConsumption => "restart_consumption",
            TokenReason::DailyReset => "daily_reset",
            TokenReason::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "signup_bonus" => TokenReason::SignupBonus,
            "ad_watch" => TokenReason::AdWatch,
            "referral_reward" => TokenReason::ReferralReward,
            "referral_signup" => TokenReason::ReferralSignup,
            "restart_consumption" => TokenReason::RestartConsumption,
            "daily_reset" => TokenReason::DailyReset,
            "admin" => TokenReason::Admin,
            _ => return None,
        })
    }
}

impl std::fmt::Display for TokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-owner retry token balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccount {
    pub owner_id: OwnerId,
    pub retry_tokens: i64,
    pub referral_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_daily_reset: Option<NaiveDate>,
}

/// One audited balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEvent {
    pub owner_id: OwnerId,
    pub delta: i64,
    pub reason: TokenReason,
    pub balance_after: i64,
    pub created_at: TimeMs,
}
