//! Append-only credit ledger. Balance is always `SUM(amount)`; nothing
//! here ever reads-then-writes a balance column, so retries are safe.

use crate::error::CoreError;
use crate::models::{charge_reference_id, refund_reference_id, EntryType, LedgerEntry};
use crate::money::Credits;
use crate::store::LedgerRepo;

#[derive(Clone)]
pub struct Ledger {
    repo: LedgerRepo,
}

impl Ledger {
    pub fn new(repo: LedgerRepo) -> Self {
        Ledger { repo }
    }

    pub async fn balance(&self, user_telegram_id: i64) -> Result<Credits, CoreError> {
        self.repo.balance(user_telegram_id).await
    }

    /// Posts a signed entry once per `(user, entry_type, reference_id)`.
    /// Returns `true` if this call actually posted it, `false` if an earlier
    /// call already had, so repeated retries of the same operation are safe.
    pub async fn post(
        &self,
        user_telegram_id: i64,
        amount: Credits,
        entry_type: EntryType,
        reference_id: impl Into<String>,
        description: Option<String>,
    ) -> Result<bool, CoreError> {
        self.repo
            .post_if_absent(user_telegram_id, amount, entry_type, reference_id, description)
            .await
    }

    /// Charges a generation's cost against the user's balance, keyed by the
    /// request id so a retried charge never double-debits.
    pub async fn charge_generation(
        &self,
        user_telegram_id: i64,
        request_id: &str,
        cost: Credits,
    ) -> Result<bool, CoreError> {
        self.post(
            user_telegram_id,
            -cost,
            EntryType::GenerationCharge,
            charge_reference_id(request_id),
            None,
        )
        .await
    }

    /// Reverses a generation's charge on failure/cancellation. Idempotent:
    /// posting the refund twice for the same request is a no-op the second
    /// time, and refunding a request that was never charged (or already
    /// refunded) is harmless.
    pub async fn refund_generation(
        &self,
        user_telegram_id: i64,
        request_id: &str,
        cost: Credits,
    ) -> Result<bool, CoreError> {
        self.post(
            user_telegram_id,
            cost,
            EntryType::GenerationRefund,
            refund_reference_id(request_id),
            None,
        )
        .await
    }

    /// Grants a referral bonus once per referred user's first paid generation,
    /// computed as a percentage of the charge (see `GENHUB_REFERRAL_BONUS_PERCENT`).
    pub async fn grant_referral_bonus(
        &self,
        referrer_telegram_id: i64,
        referred_request_id: &str,
        bonus: Credits,
    ) -> Result<bool, CoreError> {
        self.post(
            referrer_telegram_id,
            bonus,
            EntryType::ReferralBonus,
            format!("referral_{referred_request_id}"),
            None,
        )
        .await
    }

    /// Grants the one-time free-trial credit. Keyed by telegram id so only
    /// one grant per user is ever posted, independent of `claim_trial_use`'s
    /// own one-row-per-user guard in the generation repo.
    pub async fn grant_trial_credit(
        &self,
        user_telegram_id: i64,
        amount: Credits,
    ) -> Result<bool, CoreError> {
        self.post(
            user_telegram_id,
            amount,
            EntryType::TrialGrant,
            "trial",
            None,
        )
        .await
    }

    /// Admin-initiated balance adjustment (`POST /admin/credits`).
    /// Each call gets its own reference id (a fresh UUID) rather than one
    /// derived from caller input, since distinct adjustments are never meant
    /// to collapse into one another the way a generation charge/refund pair
    /// is. Returns `(old_balance, new_balance)`.
    pub async fn admin_adjustment(
        &self,
        user_telegram_id: i64,
        amount: Credits,
        reason: Option<String>,
    ) -> Result<(Credits, Credits), CoreError> {
        let old_balance = self.balance(user_telegram_id).await?;
        self.post(
            user_telegram_id,
            amount,
            EntryType::AdminAdjustment,
            uuid::Uuid::new_v4().to_string(),
            reason,
        )
        .await?;
        let new_balance = self.balance(user_telegram_id).await?;
        Ok((old_balance, new_balance))
    }

    pub async fn history(
        &self,
        user_telegram_id: i64,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        self.repo.history(user_telegram_id, limit).await
    }

    /// All entries posted for one `(user, entry_type, reference_id)` triple;
    /// at most one, used by idempotency assertions.
    pub async fn entries_for_reference(
        &self,
        user_telegram_id: i64,
        entry_type: EntryType,
        reference_id: &str,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        self.repo
            .entries_for_reference(user_telegram_id, entry_type, reference_id)
            .await
    }
}
