//! Per-subscription critical sections.
//!
//! Serialises read-modify-write of one subscription row across webhook
//! processors and interactive operations within a process. Cross-process
//! safety comes from the storage constraints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutexes, one per provider subscription id.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one critical section.
pub type SubscriptionGuard = OwnedMutexGuard<()>;

impl SubscriptionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `stripe_subscription_id`.
    pub async fn acquire(&self, stripe_subscription_id: &str) -> SubscriptionGuard {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Drop idle entries: only the map still holds them.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(stripe_subscription_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
