//! Prometheus metrics collection for entwatchd.
//!
//! Metrics are registered by [`init`] and exposed on the admin HTTP server.
//! Every `record_*` helper is a no-op until `init` has run, so the sync core
//! can be used as a library without a registry.
//!
//! - `entwatch_active_subscriptions` - live subscriptions (gauge)
//! - `entwatch_mutations_total{model,kind}` - observed store mutations
//! - `entwatch_notifications_sent_total` / `entwatch_notification_failures_total`
//! - `entwatch_subscribe_responses_total{mode}` - acks by snapshot/delta/error
//! - `entwatch_subscribe_duration_seconds{mode}` - subscribe latency
//! - `entwatch_snapshot_retries_total` - snapshot reads invalidated by a commit
//! - `entwatch_fanout_recipients` - subscribers per mutation (histogram)

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Notifications queued to subscribers.
pub static NOTIFICATIONS_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Notifications that could not be queued (closed or full).
pub static NOTIFICATION_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Snapshot reads retried because the model advanced during the read.
pub static SNAPSHOT_RETRIES: OnceLock<IntCounter> = OnceLock::new();

/// Store mutations observed, by model and kind.
pub static MUTATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Subscribe acknowledgements, by mode.
pub static SUBSCRIBE_RESPONSES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

/// Currently active subscriptions.
pub static ACTIVE_SUBSCRIPTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Currently open client connections.
pub static CONNECTED_CLIENTS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Recipients per mutation.
pub static FANOUT_RECIPIENTS: OnceLock<Histogram> = OnceLock::new();

/// Subscribe handling latency, by mode.
pub static SUBSCRIBE_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup. Later calls only log registration conflicts.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(NOTIFICATIONS_SENT, IntCounter::new("entwatch_notifications_sent_total", "Notifications queued to subscribers"));
    register!(NOTIFICATION_FAILURES, IntCounterVec::new(Opts::new("entwatch_notification_failures_total", "Notifications that could not be queued"), &["error"]));
    register!(SNAPSHOT_RETRIES, IntCounter::new("entwatch_snapshot_retries_total", "Snapshot reads retried after a concurrent commit"));
    register!(MUTATIONS, IntCounterVec::new(Opts::new("entwatch_mutations_total", "Store mutations observed"), &["model", "kind"]));
    register!(SUBSCRIBE_RESPONSES, IntCounterVec::new(Opts::new("entwatch_subscribe_responses_total", "Subscribe acknowledgements by mode"), &["mode"]));
    register!(ACTIVE_SUBSCRIPTIONS, IntGauge::new("entwatch_active_subscriptions", "Active subscriptions"));
    register!(CONNECTED_CLIENTS, IntGauge::new("entwatch_connected_clients", "Open client connections"));
    register!(FANOUT_RECIPIENTS, Histogram::with_opts(
        HistogramOpts::new("entwatch_fanout_recipients", "Subscribers notified per mutation")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0])));
    register!(SUBSCRIBE_LATENCY, HistogramVec::new(
        HistogramOpts::new("entwatch_subscribe_duration_seconds", "Subscribe handling latency by mode")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["mode"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

/// Record a committed mutation.
#[inline]
pub fn record_mutation(model: &str, kind: &str) {
    if let Some(c) = MUTATIONS.get() {
        c.with_label_values(&[model, kind]).inc();
    }
}

/// Record the outcome of one fan-out.
#[inline]
pub fn record_fanout(recipients: usize, delivered: usize) {
    if let Some(h) = FANOUT_RECIPIENTS.get() {
        h.observe(recipients as f64);
    }
    if let Some(c) = NOTIFICATIONS_SENT.get() {
        c.inc_by(delivered as u64);
    }
}

#[inline]
pub fn record_notification_failure(error: &str) {
    if let Some(c) = NOTIFICATION_FAILURES.get() {
        c.with_label_values(&[error]).inc();
    }
}

#[inline]
pub fn record_snapshot_retry() {
    if let Some(c) = SNAPSHOT_RETRIES.get() {
        c.inc();
    }
}

/// Record a subscribe acknowledgement (`snapshot`, `delta` or `error`).
#[inline]
pub fn record_subscribe(mode: &str, duration_secs: f64) {
    if let Some(c) = SUBSCRIBE_RESPONSES.get() {
        c.with_label_values(&[mode]).inc();
    }
    if let Some(h) = SUBSCRIBE_LATENCY.get() {
        h.with_label_values(&[mode]).observe(duration_secs);
    }
}

#[inline]
pub fn set_active_subscriptions(count: usize) {
    if let Some(g) = ACTIVE_SUBSCRIPTIONS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn inc_connected_clients() {
    if let Some(g) = CONNECTED_CLIENTS.get() {
        g.inc();
    }
}

#[inline]
pub fn dec_connected_clients() {
    if let Some(g) = CONNECTED_CLIENTS.get() {
        g.dec();
    }
}
