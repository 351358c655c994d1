use std::net::SocketAddr;

use crate::sql::Command;

// ── Reconciliation ──────────────────────────────────────────────

/// Counter: admission attempts. Labels: path (windowed|legacy), outcome.
pub const ADMISSIONS_TOTAL: &str = "bookd_admissions_total";

/// Counter: provisionals deleted in favor of a larger party.
pub const BOOKINGS_SUPERSEDED_TOTAL: &str = "bookd_bookings_superseded_total";

/// Counter: provisionals promoted to confirmed by the sweep.
pub const BOOKINGS_CONFIRMED_TOTAL: &str = "bookd_bookings_confirmed_total";

/// Counter: expired provisionals left pending behind a confirmed conflict (per sweep).
pub const PROVISIONALS_BLOCKED_TOTAL: &str = "bookd_provisionals_blocked_total";

/// Histogram: time spent deciding and persisting one sweep, in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "bookd_sweep_duration_seconds";

/// Counter: confirmation notifications. Labels: outcome (sent|failed).
pub const NOTIFICATIONS_TOTAL: &str = "bookd_notifications_total";

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "bookd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "bookd_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "bookd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "bookd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "bookd_connections_rejected_total";

/// Gauge: number of loaded venues.
pub const VENUES_ACTIVE: &str = "bookd_venues_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookd_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> std::io::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(std::io::Error::other)?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertBooking(_) => "insert_booking",
        Command::SelectBookings { .. } => "select_bookings",
        Command::Finalize => "finalize",
        Command::SelectStaffing { .. } => "select_staffing",
        Command::InsertEmployee { .. } => "insert_employee",
        Command::SelectEmployees => "select_employees",
        Command::InsertShift { .. } => "insert_shift",
        Command::SelectShifts => "select_shifts",
        Command::SetStandby { .. } => "set_standby",
    }
}
