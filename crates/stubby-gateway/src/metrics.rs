//! Prometheus metrics for stubby-gateway.
//!
//! Tracks how requests were answered and how the recording pipeline is doing.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

lazy_static! {
    /// Total number of requests handled, by mode and outcome
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "stubby_requests_total",
        "Total number of requests handled by the gateway",
        &["mode", "outcome"]  // outcome: forwarded|replayed|skipped|error
    )
    .expect("stubby_requests_total registers once");

    /// Replay lookups that found no record and fell through to forwarding
    pub static ref REPLAY_MISSES_TOTAL: IntCounter = register_int_counter!(
        "stubby_replay_misses_total",
        "Replay lookups that fell through to the upstream"
    )
    .expect("stubby_replay_misses_total registers once");

    pub static ref RECORDS_ENQUEUED_TOTAL: IntCounter = register_int_counter!(
        "stubby_records_enqueued_total",
        "Records captured and queued for persistence"
    )
    .expect("stubby_records_enqueued_total registers once");

    pub static ref RECORDS_WRITTEN_TOTAL: IntCounter = register_int_counter!(
        "stubby_records_written_total",
        "Records merged into their stub file"
    )
    .expect("stubby_records_written_total registers once");

    pub static ref RECORD_WRITE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "stubby_record_write_failures_total",
        "Records dropped because their stub file could not be written"
    )
    .expect("stubby_record_write_failures_total registers once");

    /// Records waiting for the next flush
    pub static ref RECORDS_PENDING: IntGauge = register_int_gauge!(
        "stubby_records_pending",
        "Records buffered in memory waiting for the next flush"
    )
    .expect("stubby_records_pending registers once");

    pub static ref BACKGROUND_TASK_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "stubby_background_task_failures_total",
        "Background recording tasks that failed",
        &["reason"]  // reason: error|panic
    )
    .expect("stubby_background_task_failures_total registers once");

    /// Upstream request duration
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "stubby_upstream_request_duration_ms",
        "Duration of upstream requests until response headers arrive",
        &["method", "status"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .expect("stubby_upstream_request_duration_ms registers once");
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(mode: &str, outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[mode, outcome]).inc();
}

pub fn record_replay_miss() {
    REPLAY_MISSES_TOTAL.inc();
}

pub fn record_enqueued() {
    RECORDS_ENQUEUED_TOTAL.inc();
    RECORDS_PENDING.inc();
}

/// One drained record finished, successfully written or not.
pub fn record_flushed(written: bool) {
    RECORDS_PENDING.dec();
    if written {
        RECORDS_WRITTEN_TOTAL.inc();
    } else {
        RECORD_WRITE_FAILURES_TOTAL.inc();
    }
}

pub fn record_background_failure(reason: &str) {
    BACKGROUND_TASK_FAILURES_TOTAL
        .with_label_values(&[reason])
        .inc();
}

pub fn record_upstream_duration(method: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, &status.to_string()])
        .observe(duration_ms);
}
