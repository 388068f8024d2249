use std::net::SocketAddr;
use std::time::Duration;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "staybook_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "staybook_query_duration_seconds";

/// Counter: failed logins and rejected tokens. Labels: stage.
pub const AUTH_FAILURES_TOTAL: &str = "staybook_auth_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "staybook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "staybook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "staybook_connections_rejected_total";

/// Gauge: live sessions after the last reaper pass.
pub const SESSIONS_ACTIVE: &str = "staybook_sessions_active";

/// Counter: sessions removed by the reaper.
pub const SESSIONS_EXPIRED_TOTAL: &str = "staybook_sessions_expired_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn record_query(command: &'static str, elapsed: Duration, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(QUERIES_TOTAL, "command" => command, "status" => status).increment(1);
    metrics::histogram!(QUERY_DURATION_SECONDS, "command" => command).record(elapsed.as_secs_f64());
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Register { .. } => "register",
        Command::Login { .. } => "login",
        Command::SetToken { .. } => "set_token",
        Command::Logout => "logout",
        Command::SelectMe => "select_me",
        Command::UpdateMe(_) => "update_me",
        Command::SelectUsers => "select_users",
        Command::SelectHotels { .. } => "select_hotels",
        Command::InsertHotel { .. } => "insert_hotel",
        Command::UpdateHotel { .. } => "update_hotel",
        Command::DeleteHotel { .. } => "delete_hotel",
        Command::SelectBookings { .. } => "select_bookings",
        Command::InsertBooking { .. } => "insert_booking",
        Command::UpdateBooking { .. } => "update_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectCheckoutDates { .. } => "select_checkout_dates",
    }
}
