//! Per-subject mutual exclusion.
//!
//! Cycles for different subjects run freely; two cycles (or a cycle and a
//! management mutation) for the same subject queue on one async mutex.
//! Slots are created on first use and dropped by [`SubjectLocks::prune_idle`]
//! once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use keepalive_core::SubjectId;

#[derive(Debug, Clone, Default)]
pub struct SubjectLocks {
    inner: Arc<Mutex<HashMap<SubjectId, Arc<Mutex<()>>>>>,
}

impl SubjectLocks {
    /// Wait for and hold the lock for `subject` until the guard drops.
    pub async fn acquire(&self, subject: &SubjectId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(subject.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Drop every slot that is neither held nor awaited.
    pub async fn prune_idle(&self) {
        let mut map = self.inner.lock().await;
        // The map's own clone is the only reference left on an idle slot.
        map.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    #[cfg(test)]
    async fn tracked_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
