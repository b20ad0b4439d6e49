//! Metrics collection and export for the Banter hub.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "banter_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "banter_connections_active";
    pub const MESSAGES_TOTAL: &str = "banter_messages_total";
    pub const MESSAGES_BYTES: &str = "banter_messages_bytes";
    pub const PRESENCE_BROADCASTS_TOTAL: &str = "banter_presence_broadcasts_total";
    pub const UPLOADS_TOTAL: &str = "banter_uploads_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "banter_upload_bytes_total";
    pub const ERRORS_TOTAL: &str = "banter_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of chat frames relayed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of chat frames relayed");
    metrics::describe_counter!(
        names::PRESENCE_BROADCASTS_TOTAL,
        "Total number of presence snapshots pushed"
    );
    metrics::describe_counter!(names::UPLOADS_TOTAL, "Total number of completed uploads");
    metrics::describe_counter!(names::UPLOAD_BYTES_TOTAL, "Total bytes of upload payloads");
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

/// Record a chat frame.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record one presence snapshot broadcast.
pub fn record_presence_broadcast() {
    counter!(names::PRESENCE_BROADCASTS_TOTAL).increment(1);
}

/// Record a completed upload.
pub fn record_upload() {
    counter!(names::UPLOADS_TOTAL).increment(1);
}

/// Record upload payload bytes as they stream through.
pub fn record_upload_bytes(bytes: usize) {
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes as u64);
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
