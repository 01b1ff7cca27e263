//! Notifier trait and the logging implementation.

use std::sync::Arc;

use tracing::info;

use sentinel_telemetry::Metrics;

use crate::event::LifecycleEvent;

/// Sink for lifecycle events.
///
/// Implementations must return promptly and swallow their own delivery
/// failures: position state never depends on a notification landing.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: LifecycleEvent);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, event: LifecycleEvent) {
        (**self).notify(event);
    }
}

/// Writes events to the log only. Used when Telegram is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: LifecycleEvent) {
        Metrics::lifecycle_event(event.kind());
        let rendered = crate::render::render(&event);
        info!(
            event = event.kind(),
            channel = %event.channel(),
            title = %rendered.title,
            body = %rendered.body,
            "Notification"
        );
    }
}
