use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::Mutex;
use tracing::debug;

/// Write locks keyed by connection string.
///
/// Every handle opened on the same connection string gets the same lock, so
/// writers to one SQLite file are serialized across the whole process while
/// readers go straight to the pool. Owned by the composition root and
/// cleared on shutdown.
#[derive(Clone, Default)]
pub struct ConnectionLocks {
    inner: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ConnectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `conn`, creating it on first use.
    pub fn lock_for(&self, conn: &str) -> Arc<Mutex<()>> {
        let mut map = self.map();
        map.entry(conn.to_string())
            .or_insert_with(|| {
                debug!("Creating write lock for {}", conn);
                Arc::new(Mutex::new(()))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every registered lock. Handles that already hold one keep it.
    pub fn clear(&self) {
        let mut map = self.map();
        debug!("Releasing {} connection locks", map.len());
        map.clear();
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        // The map stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
