//! Event bus — trait for handing finished analytics events to whatever
//! transports them (ClickHouse logger, in-memory collector, tests).
//!
//! Producers accept an `Arc<dyn EventSink>` so the destination can be swapped
//! without touching event construction.

use crate::types::{AnalyticsEvent, EventCategory};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives analytics events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// No-op sink for tests and callers that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: AnalyticsEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_category(&self, category: EventCategory) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.category.known() == Some(category))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: AnalyticsEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience: create a no-op sink.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
