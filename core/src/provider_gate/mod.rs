//! Cached upstream-balance precondition with alert deduplication.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::error::CoreError;
use crate::provider::Provider;

const BALANCE_TTL: Duration = Duration::from_secs(60);
const ALERT_DEDUP_TTL: Duration = Duration::from_secs(600);

pub struct ProviderGate {
    provider: Arc<dyn Provider>,
    balance_cache: TtlCache<(), i64>,
    alert_dedup: TtlCache<(), ()>,
    min_balance: i64,
}

impl ProviderGate {
    pub fn new(provider: Arc<dyn Provider>, min_balance: i64) -> Self {
        ProviderGate {
            provider,
            balance_cache: TtlCache::new(),
            alert_dedup: TtlCache::new(),
            min_balance,
        }
    }

    /// `Ok(())` if admission may proceed; `Err(ProviderBalanceLow)` otherwise.
    /// A provider query failure is treated as "balance unknown" and does not
    /// block admission.
    pub async fn check(&self) -> Result<(), CoreError> {
        match self.read_balance().await {
            Some(balance) if balance < self.min_balance => Err(CoreError::ProviderBalanceLow {
                balance,
                threshold: self.min_balance,
            }),
            _ => Ok(()),
        }
    }

    async fn read_balance(&self) -> Option<i64> {
        if let Some(cached) = self.balance_cache.get(&()).await {
            return Some(cached);
        }
        match self.provider.get_balance().await {
            Ok(balance) => {
                self.balance_cache.set((), balance, Some(BALANCE_TTL)).await;
                Some(balance)
            }
            Err(_) => None,
        }
    }

    /// Returns `true` the first time it's called within the dedup window,
    /// `false` on every subsequent call until the window elapses. Callers
    /// use this to decide whether to actually notify admins.
    pub async fn should_alert(&self) -> bool {
        if self.alert_dedup.contains(&()).await {
            return false;
        }
        self.alert_dedup.set((), (), Some(ALERT_DEDUP_TTL)).await;
        true
    }
}
