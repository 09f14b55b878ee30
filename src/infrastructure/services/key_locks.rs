//! Per-key async locks serializing writes to one cache key

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock table keyed by `(query_type, query_hash)`
///
/// Entries are created on demand and dropped once the last holder or waiter
/// releases them.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held while a key is being written; releases the key on drop
#[derive(Debug)]
pub(crate) struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait until no other writer holds `query_type`/`query_hash`
    pub(crate) async fn lock(&self, query_type: &str, query_hash: &str) -> KeyGuard<'_> {
        let key = format!("{}:{}", query_type, query_hash);

        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        KeyGuard {
            owner: self,
            key,
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of keys currently held or awaited
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());

        // The table and this guard are the only references left
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.key);
        }
    }
}
