//! Named mutex registry used by Lock nodes
//!
//! Process-wide, constructed once and shared by reference. Acquisition is
//! always bounded: it fails with a Synchronization error on timeout and gives
//! up early when the owning job is cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Held for the lifetime of a Lock node's body; releases on drop
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.table.lock();
        // Only the table's own handle left: nobody holds or awaits the lock
        if locks
            .get(&self.name)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.name);
        }
        debug!(lock = %self.name, "Lock released");
    }
}

/// Outcome of an acquire that did not produce a guard
#[derive(Debug, PartialEq)]
pub enum AcquireError {
    TimedOut(EngineError),
    Cancelled,
}

#[derive(Debug, Default)]
pub struct SyncRegistry {
    locks: LockTable,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, name: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire `name`, waiting at most `timeout`
    pub async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockGuard> {
        match self.acquire_cancellable(name, timeout, None).await {
            Ok(guard) => Ok(guard),
            Err(AcquireError::TimedOut(e)) => Err(e),
            Err(AcquireError::Cancelled) => Err(EngineError::Synchronization(format!(
                "Acquisition of lock '{}' was cancelled",
                name
            ))),
        }
    }

    /// Like `acquire`, but abandons the wait when `cancel` fires
    pub async fn acquire_cancellable(
        &self,
        name: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> std::result::Result<LockGuard, AcquireError> {
        let mutex = self.entry(name);
        let wait = tokio::time::timeout(timeout, mutex.lock_owned());

        let acquired = match cancel {
            Some(token) => tokio::select! {
                r = wait => r,
                _ = token.cancelled() => return Err(AcquireError::Cancelled),
            },
            None => wait.await,
        };

        match acquired {
            Ok(guard) => {
                debug!(lock = %name, "Lock acquired");
                Ok(LockGuard {
                    name: name.to_string(),
                    guard: Some(guard),
                    table: self.locks.clone(),
                })
            }
            Err(_) => {
                warn!(lock = %name, timeout_ms = timeout.as_millis() as u64, "Lock timeout");
                Err(AcquireError::TimedOut(EngineError::Synchronization(format!(
                    "Lock '{}' not acquired within {}ms",
                    name,
                    timeout.as_millis()
                ))))
            }
        }
    }

    /// Number of lock names currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
