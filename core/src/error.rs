//! Core error taxonomy.
//!
//! Variants line up 1:1 with the error kinds in the orchestration design:
//! each is surfaced at the API boundary with a fixed HTTP status and,
//! where relevant, extra fields (`active_count`/`limit`, `balance`/`threshold`).

use thiserror::Error;

/// Error produced by any core operation (Gateway, Poller, Ledger, Broadcast Scheduler,
/// Provider Gate, Reaper).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A submitted parameter failed validation (unsupported, invalid value, bad size).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Model key does not resolve to an active model.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Neither the dynamic pricing table nor an active ModelPrice covers this request.
    #[error("no price configured for this model/parameter combination")]
    PriceNotFound,

    /// Balance is insufficient to cover the computed price and no trial is available.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Caller already has `limit` generations in an active state.
    #[error("active generation limit reached ({active_count}/{limit})")]
    ActiveLimit { active_count: i64, limit: i64 },

    /// Cached or freshly-queried upstream balance is below the configured threshold.
    #[error("provider balance below threshold ({balance}/{threshold})")]
    ProviderBalanceLow { balance: i64, threshold: i64 },

    /// Upstream provider rejected or failed the initial submission.
    #[error("provider submit failed: {0}")]
    ProviderSubmitFailed(String),

    /// Transient error while polling upstream for status; never terminal on its own.
    #[error("provider poll error: {0}")]
    ProviderPollError(String),

    /// Poller exceeded `max_duration` without reaching a terminal upstream state.
    #[error("polling timeout")]
    PollingTimeout,

    /// Chat platform reports the recipient blocked or deactivated the bot.
    #[error("recipient blocked")]
    RecipientBlocked,

    /// Request/generation/broadcast id does not exist or does not belong to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted on a broadcast/request in the wrong state (e.g. `start` on non-pending).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// SQLite storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Upstream HTTP transport error.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Anything else; logged and, for orphaned generations, left for the Reaper.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization: {e}"))
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        CoreError::Internal(format!("blocking task join failed: {e}"))
    }
}
