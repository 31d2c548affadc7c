//! Capture of `tracing` events for assertions on log output.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::span;
use tracing::{Event, Level, Metadata, Subscriber};

/// One recorded event: its level and rendered `message` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
}

/// A subscriber that records every event emitted while it is the
/// thread's default.
///
/// Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this capture installed as the thread's subscriber.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::subscriber::with_default(self.clone(), f)
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    /// Whether an event with exactly this level and message was recorded.
    pub fn contains(&self, level: Level, message: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.level == level && e.message == message)
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl Subscriber for EventCapture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }

    fn record(&self, _: &span::Id, _: &span::Record<'_>) {}

    fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events
            .lock()
            .expect("event log poisoned")
            .push(CapturedEvent {
                level: *event.metadata().level(),
                message: visitor.0,
            });
    }

    fn enter(&self, _: &span::Id) {}

    fn exit(&self, _: &span::Id) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_level_and_message() {
        let capture = EventCapture::new();
        capture.capture(|| {
            tracing::debug!(answer = 42, "hello");
            tracing::warn!("careful");
        });
        assert!(capture.contains(Level::DEBUG, "hello"));
        assert!(capture.contains(Level::WARN, "careful"));
        assert_eq!(capture.events().len(), 2);
    }

    #[test]
    fn events_outside_capture_are_ignored() {
        let capture = EventCapture::new();
        tracing::info!("not captured");
        assert!(capture.events().is_empty());
    }
}
