//! Per-domain commit serialization
//!
//! Every write path acquires the domain's lock before reading its snapshot
//! and keeps it until the commit is done. Different domains never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily created async mutex per domain name
#[derive(Debug, Default)]
pub(crate) struct DomainLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DomainLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `domain`
    ///
    /// The guard is owned so it can move into a spawned commit task.
    pub(crate) async fn acquire(&self, domain: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // drop entries nobody holds or waits on
            locks.retain(|name, lock| name == domain || Arc::strong_count(lock) > 1);
            locks
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
