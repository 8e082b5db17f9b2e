//! Per-user serialization lock. SQLite has no cluster-wide advisory lock
//! primitive, so this is an in-process `tokio::sync::Mutex` keyed by
//! telegram id — correct for a single-process deployment only; a
//! multi-process deployment would need a store that supports real advisory
//! locks; see DESIGN.md.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

pub struct UserLockRegistry {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLockRegistry {
    pub fn new() -> Self {
        UserLockRegistry {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for `user_telegram_id`, creating it on first use.
    /// The guard's lifetime is the critical section; dropping it releases
    /// the lock (the async analogue of "automatic release on transaction end").
    pub async fn lock(&self, user_telegram_id: i64) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().expect("lock registry mutex poisoned");
            locks
                .entry(user_telegram_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

impl Default for UserLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
