/// Metrics and telemetry
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Upload and delete outcomes
/// - Orphaned blobs left behind by failed metadata writes
/// - Metadata backend selection

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    // ========== Coordinator Metrics ==========

    /// Image uploads by outcome
    pub static ref IMAGE_UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "image_uploads_total",
        "Total number of image uploads",
        &["outcome"]
    )
    .unwrap();

    /// Image deletes by outcome
    pub static ref IMAGE_DELETES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "image_deletes_total",
        "Total number of image deletes",
        &["outcome"]
    )
    .unwrap();

    /// Blobs uploaded whose metadata write failed and were not removed
    pub static ref ORPHANED_BLOBS_TOTAL: IntCounter = register_int_counter!(
        "orphaned_blobs_total",
        "Blobs left in the blob store without a metadata record"
    )
    .unwrap();

    // ========== Backend Metrics ==========

    /// Metadata backend construction attempts by engine and outcome
    pub static ref BACKEND_SELECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "backend_selection_total",
        "Metadata backend construction attempts",
        &["engine", "outcome"]
    )
    .unwrap();
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

/// Record an upload outcome (`success`, `invalid`, `upload_error`, `persistence_error`)
pub fn record_upload(outcome: &str) {
    IMAGE_UPLOADS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a delete outcome
pub fn record_delete(outcome: &str) {
    IMAGE_DELETES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to string: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/v1/images", 200, 0.05);
        let metrics = export_metrics().unwrap();
        assert!(metrics.contains("http_requests_total"));
    }

    #[test]
    fn test_orphan_counter_exported() {
        ORPHANED_BLOBS_TOTAL.inc();
        let metrics = export_metrics().unwrap();
        assert!(metrics.contains("orphaned_blobs_total"));
    }
}
