mod conflict;
mod error;
mod mutations;
mod queries;
mod store;
#[cfg(test)]
mod tests;
mod validate;

pub use error::{ConflictKind, EngineError, StoreError};
pub use store::{BookingStore, MemoryStore, ScanDirection, WalStore};

use std::sync::Arc;
use std::time::Duration;

use crate::limits::*;
use crate::lock::{ExclusionCoordinator, ExclusionGuard};

/// Tunables for conflict detection and lock waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Two table bookings whose starts are closer than this collide.
    pub slot_minutes: i32,
    /// Lock wait for create, the contended path.
    pub create_lock_wait: Duration,
    /// Lock wait for every other mutation.
    pub lock_wait: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            slot_minutes: DEFAULT_SLOT_MINUTES,
            create_lock_wait: Duration::from_millis(DEFAULT_CREATE_LOCK_WAIT_MS),
            lock_wait: Duration::from_millis(DEFAULT_LOCK_WAIT_MS),
        }
    }
}

/// Booking allocator over one shared table.
///
/// Mutations run entirely under the exclusion lock: validation, the
/// conflict scan over a fresh snapshot, and the write form one unit.
/// Reads take no lock and see whatever the store holds at that moment.
pub struct Engine {
    store: Arc<dyn BookingStore>,
    lock: ExclusionCoordinator,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        lock: ExclusionCoordinator,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            lock,
            settings,
        }
    }

    /// Engine over a volatile in-memory table with an in-process lock.
    pub fn in_memory(settings: EngineSettings) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            ExclusionCoordinator::new(),
            settings,
        )
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    /// Enter the exclusion window or fail with `Busy` once `wait` runs out.
    async fn exclusive(&self, wait: Duration) -> Result<ExclusionGuard, EngineError> {
        Ok(self.lock.try_acquire(wait).await?)
    }
}
