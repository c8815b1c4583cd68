//! Process-wide scheduling lock
//!
//! Serializes start decisions across every robot. Only the start call runs
//! under it; queue reads and the emergency workflows do not.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared lock around start decisions. Clones share the same lock.
#[derive(Debug, Clone, Default)]
pub struct SchedulingLock {
    inner: Arc<Mutex<()>>,
}

/// Held while a start decision is in progress; released on drop
#[derive(Debug)]
pub struct SchedulingPermit {
    _guard: OwnedMutexGuard<()>,
}

impl SchedulingLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock. Blocks without timeout.
    pub async fn acquire(&self) -> SchedulingPermit {
        SchedulingPermit {
            _guard: self.inner.clone().lock_owned().await,
        }
    }

    /// Take the lock if nobody holds it
    pub fn try_acquire(&self) -> Option<SchedulingPermit> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| SchedulingPermit { _guard: guard })
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
