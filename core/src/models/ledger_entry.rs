use crate::money::Credits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only ledger entry type. Balance is never materialized as a column;
/// it is always the sum of `amount` over a user's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    GenerationCharge,
    GenerationRefund,
    ReferralBonus,
    TrialGrant,
    AdminAdjustment,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::GenerationCharge => "generation_charge",
            EntryType::GenerationRefund => "generation_refund",
            EntryType::ReferralBonus => "referral_bonus",
            EntryType::TrialGrant => "trial_grant",
            EntryType::AdminAdjustment => "admin_adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "deposit" => EntryType::Deposit,
            "generation_charge" => EntryType::GenerationCharge,
            "generation_refund" => EntryType::GenerationRefund,
            "referral_bonus" => EntryType::ReferralBonus,
            "trial_grant" => EntryType::TrialGrant,
            "admin_adjustment" => EntryType::AdminAdjustment,
            _ => return None,
        })
    }
}

/// One append-only posting against a user's balance. Idempotent on
/// `(user, entry_type, reference_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_telegram_id: i64,
    pub amount: Credits,
    pub entry_type: EntryType,
    pub reference_id: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Builds the reference id used for a generation's compensating refund.
pub fn refund_reference_id(request_id: &str) -> String {
    format!("refund_{request_id}")
}

/// Builds the reference id used for a generation's charge.
pub fn charge_reference_id(request_id: &str) -> String {
    request_id.to_string()
}
