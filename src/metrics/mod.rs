//! Metrics module
//!
//! Prometheus counters and histograms for the gateway, registered in the
//! default registry and exposed on the main listener (see `MetricsConfig`).

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "media_gateway_uploads_total",
        "Total number of uploads",
        &["backend", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "media_gateway_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    // Storage metrics
    pub static ref STORAGE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "media_gateway_storage_operation_duration_seconds",
        "Storage backend call duration in seconds",
        &["backend", "operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Validation metrics
    pub static ref VALIDATION_REJECTIONS: CounterVec = register_counter_vec!(
        "media_gateway_validation_rejections_total",
        "Files rejected before reaching storage",
        &["reason"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "media_gateway_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(backend: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[backend, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(backend: &str) {
    UPLOADS_TOTAL.with_label_values(&[backend, "failure"]).inc();
}

/// Record how long a backend call took
pub fn record_storage_operation(backend: &str, operation: &str, duration_secs: f64) {
    STORAGE_OPERATION_DURATION
        .with_label_values(&[backend, operation])
        .observe(duration_secs);
}

/// Record a file rejected by the upload policy
pub fn record_validation_rejection(reason: &str) {
    VALIDATION_REJECTIONS.with_label_values(&[reason]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in the Prometheus text format.
///
/// Returns the content type together with the encoded body.
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
