//! Prometheus metrics and structured logging for Sentinel.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus metrics for the monitor loop, price feed, notifier and store

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat};
pub use metrics::Metrics;
