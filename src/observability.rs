use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "parlot_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "parlot_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "parlot_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "parlot_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "parlot_connections_rejected_total";

/// Gauge: number of active merchants (loaded engines).
pub const MERCHANTS_ACTIVE: &str = "parlot_merchants_active";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "parlot_auth_failures_total";

/// Counter: acquire attempts rejected because a slot was already claimed.
pub const LOCK_CONFLICTS_TOTAL: &str = "parlot_lock_conflicts_total";

/// Counter: expired locks released by the reaper.
pub const LOCKS_REAPED_TOTAL: &str = "parlot_locks_reaped_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parlot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parlot_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertBusinessDay { .. } => "insert_business_day",
        Command::InsertStaffDay { .. } => "insert_staff_day",
        Command::InsertBlock { .. } => "insert_block",
        Command::DeleteBlock { .. } => "delete_block",
        Command::InsertLock { .. } => "insert_lock",
        Command::UpdateLock { .. } => "update_lock",
        Command::DeleteLock { .. } => "delete_lock",
        Command::InsertBooking { .. } => "insert_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectStarts { .. } => "select_starts",
        Command::SelectGrid { .. } => "select_grid",
        Command::SelectLocks { .. } => "select_locks",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectBusinessDays { .. } => "select_business_days",
        Command::Listen { .. } => "listen",
        Command::Unlisten { .. } => "unlisten",
        Command::UnlistenAll => "unlisten_all",
    }
}
