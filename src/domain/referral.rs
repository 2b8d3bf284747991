//! Referral relationship and code helpers.

use crate::domain::{OwnerId, TimeMs};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters in an issued referral code.
pub const REFERRAL_CODE_LEN: usize = 8;

/// A redeemed referral. At most one exists per referee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub referrer_id: OwnerId,
    pub referee_id: OwnerId,
    pub code: String,
    pub created_at: TimeMs,
}

/// Derive the candidate code for `owner` at a given collision `nonce`.
///
/// Deterministic, so the same owner always gets the same code unless an
/// earlier nonce collided with somebody else's.
pub fn derive_referral_code(owner: &OwnerId, nonce: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_str().as_bytes());
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode_upper(&digest[..REFERRAL_CODE_LEN / 2])
}

/// Normalize user input before a registry lookup.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}
