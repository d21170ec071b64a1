use std::net::SocketAddr;

use crate::api::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: action, status.
pub const REQUESTS_TOTAL: &str = "tablebook_requests_total";

/// Histogram: request latency in seconds. Labels: action.
pub const REQUEST_DURATION_SECONDS: &str = "tablebook_request_duration_seconds";

/// Counter: bookings appended.
pub const BOOKINGS_CREATED_TOTAL: &str = "tablebook_bookings_created_total";

/// Counter: creates rejected by a conflict rule. Labels: kind.
pub const CONFLICTS_TOTAL: &str = "tablebook_conflicts_total";

// ── Exclusion lock ──────────────────────────────────────────────

/// Counter: mutations turned away because the lock wait ran out.
pub const LOCK_BUSY_TOTAL: &str = "tablebook_lock_busy_total";

/// Histogram: time spent waiting for the lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "tablebook_lock_wait_seconds";

/// Histogram: time the lock was held, in seconds.
pub const LOCK_HOLD_SECONDS: &str = "tablebook_lock_hold_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open client connections.
pub const CONNECTIONS_ACTIVE: &str = "tablebook_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "tablebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "tablebook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command, for metrics and logs.
pub fn action_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Create(_) => "create",
        Command::All => "all",
        Command::Today { .. } => "today",
        Command::Active { .. } => "active",
        Command::History { .. } => "history",
        Command::Update { .. } => "update",
        Command::Status { .. } => "status",
        Command::Cancel { .. } => "cancel",
        Command::Delete { .. } => "delete",
    }
}
