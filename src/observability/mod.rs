//! Observability for the storage service
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//!
//! # Usage
//!
//! ```ignore
//! use backend_storage::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::SearchComplete, &[("collection", "users"), ("count", "3")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Failure events are logged at ERROR, everything else at INFO.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a per-step event at TRACE
pub fn trace_event(event: Event, fields: &[(&str, &str)]) {
    Logger::trace(event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Verifies no panic
        log_event(Event::Serving);
        log_event_with_fields(Event::CollectionOpened, &[("name", "users")]);
        trace_event(Event::JoinResolved, &[("join", "orders")]);
    }
}
