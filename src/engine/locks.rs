//! Per-visitor serialization of cluster updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::VISITOR_LOCK_PRUNE_THRESHOLD;

/// Table of async mutexes keyed by visitor id.
///
/// Two visits of the same visitor never run match-then-update concurrently;
/// visits of different visitors never wait on each other. Entries nobody
/// holds are pruned once the table grows past a threshold.
#[derive(Debug, Default)]
pub struct VisitorLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl VisitorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the visitor's lock.
    pub async fn lock(&self, visitor_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            // A panic while holding the table lock leaves the map intact
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > VISITOR_LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(visitor_id.to_string()).or_default())
        };
        entry.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
