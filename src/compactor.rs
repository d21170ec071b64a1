use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::WalStore;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once `threshold` appends pile up.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}

/// One compaction check. Returns whether the log was rewritten.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not due");
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!(path = %store.path().display(), appends, "WAL compacted");
            true
        }
        Err(e) => {
            warn!(path = %store.path().display(), "WAL compaction failed: {e}");
            false
        }
    }
}
