use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("lock not acquired within {0:?}")]
    Timeout(Duration),
}

/// The single table-wide lock that serializes every read-modify-write.
///
/// The lock lives in this process. That is enough because a `WalStore`
/// refuses to open a log another process already owns, so one process is
/// the only writer of a given table.
#[derive(Default)]
pub struct ExclusionCoordinator {
    local: Arc<Mutex<()>>,
}

/// Proof of exclusivity. Dropping it releases the lock on every exit path.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusionGuard {
    acquired_at: Instant,
    _local: OwnedMutexGuard<()>,
}

impl ExclusionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `wait` for the lock.
    pub async fn try_acquire(&self, wait: Duration) -> Result<ExclusionGuard, AcquireError> {
        let started = Instant::now();
        let local = match tokio::time::timeout(wait, self.local.clone().lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_BUSY_TOTAL).increment(1);
                tracing::warn!(wait_ms = wait.as_millis() as u64, "exclusion lock busy");
                return Err(AcquireError::Timeout(wait));
            }
        };

        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(ExclusionGuard {
            acquired_at: Instant::now(),
            _local: local,
        })
    }
}

impl ExclusionGuard {
    /// Release now instead of at end of scope.
    pub fn release(self) {}

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for ExclusionGuard {
    fn drop(&mut self) {
        metrics::histogram!(crate::observability::LOCK_HOLD_SECONDS)
            .record(self.acquired_at.elapsed().as_secs_f64());
    }
}
