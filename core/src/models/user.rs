use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat-platform user. Created on first contact; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub referral_code: String,
    pub referrer_telegram_id: Option<i64>,
    pub is_banned: bool,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Builds a freshly-seen user row. `referral_code` generation is the caller's
    /// responsibility (see `gateway::random_referral_code`), kept out of the model
    /// type so tests can construct deterministic fixtures.
    pub fn new(telegram_id: i64, referral_code: String, now: DateTime<Utc>) -> Self {
        User {
            id: 0,
            telegram_id,
            referral_code,
            referrer_telegram_id: None,
            is_banned: false,
            last_active_at: now,
            created_at: now,
        }
    }
}
