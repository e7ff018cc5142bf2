//! Metrics collection and export for the Easel server.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "easel_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "easel_connections_active";
    pub const MESSAGES_TOTAL: &str = "easel_messages_total";
    pub const MESSAGES_BYTES: &str = "easel_messages_bytes";
    pub const ROOMS_ACTIVE: &str = "easel_rooms_active";
    pub const EVENTS_TOTAL: &str = "easel_events_total";
    pub const UNDO_TOTAL: &str = "easel_undo_total";
    pub const CLEAR_TOTAL: &str = "easel_clear_total";
    pub const ERRORS_TOTAL: &str = "easel_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages processed");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of rooms");
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total stroke events appended");
    metrics::describe_counter!(names::UNDO_TOTAL, "Total undo requests by outcome");
    metrics::describe_counter!(names::CLEAR_TOTAL, "Total clear requests");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a message.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record an appended stroke event.
pub fn record_event() {
    counter!(names::EVENTS_TOTAL).increment(1);
}

/// Record an undo request, labeled by whether it changed the log.
pub fn record_undo(changed: bool) {
    let outcome = if changed { "removed" } else { "noop" };
    counter!(names::UNDO_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a clear request.
pub fn record_clear() {
    counter!(names::CLEAR_TOTAL).increment(1);
}

/// Update the active room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
