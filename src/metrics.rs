use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Metric name prefix for all Sentinel metrics
const PREFIX: &str = "sentinel";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Push stream metrics
    pub static ref STREAM_CONNECT_ATTEMPTS_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_stream_connect_attempts_total"),
        "Total push transport connection attempts"
    ).expect("Failed to create stream_connect_attempts_total metric");

    pub static ref STREAM_RECONNECTS_SCHEDULED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_stream_reconnects_scheduled_total"),
        "Total reconnect timers scheduled after transport errors"
    ).expect("Failed to create stream_reconnects_scheduled_total metric");

    pub static ref STREAM_FRAMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_stream_frames_total"), "Push frames by outcome"),
        &["outcome"]
    ).expect("Failed to create stream_frames_total metric");

    // Notification store metrics
    pub static ref NOTIFICATIONS_MERGED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_merged_total"), "Pushed notifications merged into the store"),
        &["outcome"]
    ).expect("Failed to create notifications_merged_total metric");

    pub static ref NOTIFICATION_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_notification_fetches_total"), "REST page fetches by mode and result"),
        &["mode", "result"]
    ).expect("Failed to create notification_fetches_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(STREAM_CONNECT_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STREAM_RECONNECTS_SCHEDULED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STREAM_FRAMES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_MERGED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATION_FETCHES_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_frame(outcome: &str) {
    STREAM_FRAMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_merge(outcome: &str) {
    NOTIFICATIONS_MERGED_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_fetch(mode: &str, result: &str) {
    NOTIFICATION_FETCHES_TOTAL
        .with_label_values(&[mode, result])
        .inc();
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
}
