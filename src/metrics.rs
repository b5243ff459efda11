//! Prometheus metrics collection for superchatd.
//!
//! Tracks connection churn, message throughput, fan-out volume, and error
//! counts by class, exposed on the `/metrics` HTTP endpoint.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total frames decoded from clients.
    pub static ref FRAMES_RECEIVED: IntCounter = IntCounter::new(
        "superchat_frames_received_total",
        "Frames received from clients"
    ).unwrap();

    /// Total messages persisted via POST_MESSAGE.
    pub static ref MESSAGES_POSTED: IntCounter = IntCounter::new(
        "superchat_messages_posted_total",
        "Messages persisted"
    ).unwrap();

    /// Total NEW_MESSAGE frames fanned out to subscribers.
    pub static ref MESSAGES_FANNED_OUT: IntCounter = IntCounter::new(
        "superchat_messages_fanned_out_total",
        "NEW_MESSAGE deliveries"
    ).unwrap();

    /// Total rate limit hits.
    pub static ref RATE_LIMITED: IntCounter = IntCounter::new(
        "superchat_rate_limited_total",
        "Rate limit hits"
    ).unwrap();

    /// Total sessions closed for outbound queue overflow.
    pub static ref SLOW_CONSUMERS: IntCounter = IntCounter::new(
        "superchat_slow_consumers_total",
        "Sessions closed as slow consumers"
    ).unwrap();

    /// ERROR frames sent, labeled by error class.
    pub static ref ERRORS_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("superchat_errors_sent_total", "ERROR frames sent"),
        &["class"]
    ).unwrap();

    /// Currently connected sessions.
    pub static ref CONNECTED_SESSIONS: IntGauge = IntGauge::new(
        "superchat_connected_sessions",
        "Currently connected sessions"
    ).unwrap();

    /// Registered directory entries.
    pub static ref DIRECTORY_ENTRIES: IntGauge = IntGauge::new(
        "superchat_directory_entries",
        "Registered directory entries"
    ).unwrap();
}

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    REGISTRY.register(Box::new(FRAMES_RECEIVED.clone())).unwrap();
    REGISTRY.register(Box::new(MESSAGES_POSTED.clone())).unwrap();
    REGISTRY.register(Box::new(MESSAGES_FANNED_OUT.clone())).unwrap();
    REGISTRY.register(Box::new(RATE_LIMITED.clone())).unwrap();
    REGISTRY.register(Box::new(SLOW_CONSUMERS.clone())).unwrap();
    REGISTRY.register(Box::new(ERRORS_SENT.clone())).unwrap();
    REGISTRY.register(Box::new(CONNECTED_SESSIONS.clone())).unwrap();
    REGISTRY.register(Box::new(DIRECTORY_ENTRIES.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
