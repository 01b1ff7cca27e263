//! Prometheus metrics for Sentinel.
//!
//! # Panics
//!
//! Metric registration panics on a duplicate metric name.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, CounterVec, Encoder, Gauge, Histogram,
    IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Number of positions currently ACTIVE in the store.
pub static ACTIVE_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sentinel_active_positions", "Positions currently monitored").unwrap()
});

/// Lifecycle events emitted to the notifier.
/// Labels: event (added/active/target1_hit/closed)
pub static LIFECYCLE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sentinel_lifecycle_events_total",
        "Position lifecycle events emitted",
        &["event"]
    )
    .unwrap()
});

/// Closed positions by exit reason and mode.
pub static EXITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sentinel_exits_total",
        "Positions closed by the monitor",
        &["reason", "mode"]
    )
    .unwrap()
});

/// Absolute realized points of closed positions, split by outcome.
pub static REALIZED_POINTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_realized_points_total",
        "Sum of |exit - entry| points, split by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Monitor price fetches that produced no usable quote.
/// Labels: cause (timeout/error/missing/non_positive)
pub static PRICE_FALLBACK_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sentinel_price_fallback_total",
        "Price fetches without a usable quote",
        &["cause"]
    )
    .unwrap()
});

/// Failed store flushes (retried next cycle).
pub static PERSISTENCE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sentinel_persistence_failures_total",
        "Failed position store flushes"
    )
    .unwrap()
});

/// Wall time of one monitor cycle in milliseconds.
pub static MONITOR_CYCLE_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "sentinel_monitor_cycle_ms",
        "Monitor cycle duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 3000.0]
    )
    .unwrap()
});

/// Notification delivery failures.
pub static NOTIFY_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sentinel_notify_failures_total",
        "Notifications that could not be delivered",
        &["reason"]
    )
    .unwrap()
});

/// Orders sent through the router.
pub static ORDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sentinel_orders_total",
        "Orders routed to the broker or paper book",
        &["router", "result"]
    )
    .unwrap()
});

/// Free-channel requests redirected to the premium channel.
pub static CHANNEL_REDIRECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sentinel_channel_redirects_total",
        "Positions redirected off the free channel by the daily limit"
    )
    .unwrap()
});

/// Market feed connection state (1 = connected).
pub static FEED_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("sentinel_feed_connected", "Market feed connection state").unwrap()
});

/// Ticker packets applied to the LTP cache.
pub static FEED_TICKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("sentinel_feed_ticks_total", "Ticker packets decoded").unwrap()
});

/// Market feed reconnects.
pub static FEED_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sentinel_feed_reconnect_total",
        "Market feed reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn set_active_positions(count: usize) {
        ACTIVE_POSITIONS.set(count as i64);
    }

    pub fn lifecycle_event(event: &str) {
        LIFECYCLE_EVENTS_TOTAL.with_label_values(&[event]).inc();
    }

    /// Record a closed position. `points` is signed profit in price points.
    pub fn position_closed(reason: &str, mode: &str, points: f64) {
        EXITS_TOTAL.with_label_values(&[reason, mode]).inc();
        let outcome = if points >= 0.0 { "profit" } else { "loss" };
        REALIZED_POINTS
            .with_label_values(&[outcome])
            .inc_by(points.abs());
    }

    pub fn price_fallback(cause: &str) {
        PRICE_FALLBACK_TOTAL.with_label_values(&[cause]).inc();
    }

    pub fn persistence_failure() {
        PERSISTENCE_FAILURES_TOTAL.inc();
    }

    pub fn monitor_cycle(duration_ms: f64) {
        MONITOR_CYCLE_MS.observe(duration_ms);
    }

    pub fn notify_failure(reason: &str) {
        NOTIFY_FAILURES_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn order_routed(router: &str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        ORDERS_TOTAL.with_label_values(&[router, result]).inc();
    }

    pub fn channel_redirect() {
        CHANNEL_REDIRECTS_TOTAL.inc();
    }

    pub fn feed_connected() {
        FEED_CONNECTED.set(1.0);
    }

    pub fn feed_disconnected() {
        FEED_CONNECTED.set(0.0);
    }

    pub fn feed_tick() {
        FEED_TICKS_TOTAL.inc();
    }

    pub fn feed_reconnect(reason: &str) {
        FEED_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
