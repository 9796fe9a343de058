use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "venuebook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "venuebook_query_duration_seconds";

/// Counter: reservation attempts. Labels: service, outcome (inserted | conflict).
pub const RESERVATIONS_TOTAL: &str = "venuebook_reservations_total";

/// Counter: availability reads that failed open. Labels: service.
pub const AVAILABILITY_FAIL_OPEN_TOTAL: &str = "venuebook_availability_fail_open_total";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "venuebook_connections_active";
pub const CONNECTIONS_TOTAL: &str = "venuebook_connections_total";
pub const CONNECTIONS_REJECTED_TOTAL: &str = "venuebook_connections_rejected_total";

/// Gauge: venues with a loaded engine.
pub const TENANTS_ACTIVE: &str = "venuebook_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "venuebook_wal_flush_duration_seconds";

/// Histogram: events per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "venuebook_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command in metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertBooking { .. } => "insert_booking",
        Command::UpdateBookingStatus { .. } => "update_booking_status",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectUnavailableSlots { .. } => "select_unavailable_slots",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectFullyBookedDates { .. } => "select_fully_booked_dates",
    }
}
