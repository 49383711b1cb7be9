//! Observability
//!
//! - Structured JSON logging
//! - Typed lifecycle events
//! - Monotonic counters
//!
//! Observability is read-only: nothing here can fail a pass. Secrets are
//! never passed as log fields; use `credentials::fingerprint` instead.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
