use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking mutations. Labels: op, status.
pub const BOOKINGS_TOTAL: &str = "rota_bookings_total";

/// Histogram: conflict+capacity check latency in seconds. Labels: op.
pub const BOOKING_CHECK_DURATION_SECONDS: &str = "rota_booking_check_duration_seconds";

// ── Dispatcher metrics ──────────────────────────────────────────

/// Counter: rows claimed by dispatcher ticks.
pub const REMINDERS_CLAIMED_TOTAL: &str = "rota_reminders_claimed_total";

/// Counter: reminder sends handed to the transport successfully.
pub const REMINDERS_SENT_TOTAL: &str = "rota_reminders_sent_total";

/// Counter: channel deliveries suppressed by preferences/quiet hours.
pub const REMINDERS_SUPPRESSED_TOTAL: &str = "rota_reminders_suppressed_total";

/// Counter: rows marked Failed after a transport error.
pub const REMINDERS_FAILED_TOTAL: &str = "rota_reminders_failed_total";

/// Counter: claimed rows dropped because the booking was gone.
pub const REMINDERS_CANCELLED_TOTAL: &str = "rota_reminders_cancelled_total";

/// Histogram: dispatcher tick duration in seconds.
pub const DISPATCH_TICK_DURATION_SECONDS: &str = "rota_dispatch_tick_duration_seconds";

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
