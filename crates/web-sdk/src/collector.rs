//! Event collector — ingests validated analytics events, forwards them to the
//! event sink, and maintains per-session metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use folio_core::event_bus::{noop_sink, EventSink};
use folio_core::types::{AnalyticsEvent, EventCategory};

/// Per-session aggregate counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub page_views: u64,
    pub project_interactions: u64,
    pub outbound_clicks: u64,
    pub newsletter_signups: u64,
    pub errors: u64,
    pub anonymized_events: u64,
    pub total_events: u64,
}

/// Collects events, emits them to the sink, and tracks per-session metrics.
/// Safe to share between request handlers.
pub struct WebEventCollector {
    ingested: AtomicU64,
    session_metrics: DashMap<String, SessionMetrics>,
    event_sink: Arc<dyn EventSink>,
}

impl Default for WebEventCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebEventCollector {
    pub fn new() -> Self {
        Self {
            ingested: AtomicU64::new(0),
            session_metrics: DashMap::new(),
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for forwarding events downstream.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Ingest a single event. Callers validate before ingesting.
    pub fn ingest(&self, event: AnalyticsEvent) {
        // Scoped to drop the DashMap ref before the event moves into the sink
        {
            let mut metrics = self
                .session_metrics
                .entry(event.session_id.clone())
                .or_insert_with(|| SessionMetrics {
                    session_id: event.session_id.clone(),
                    ..Default::default()
                });
            metrics.total_events += 1;
            if event.anonymized {
                metrics.anonymized_events += 1;
            }
            match event.category.known() {
                Some(EventCategory::PageView) => metrics.page_views += 1,
                Some(
                    EventCategory::ProjectView
                    | EventCategory::ProjectClick
                    | EventCategory::ProjectFilter,
                ) => metrics.project_interactions += 1,
                Some(EventCategory::ExternalLink | EventCategory::SocialClick) => {
                    metrics.outbound_clicks += 1
                }
                Some(EventCategory::NewsletterSignup) => metrics.newsletter_signups += 1,
                Some(EventCategory::ErrorOccurred) => metrics.errors += 1,
                _ => {}
            }
        }

        debug!(
            event_id = %event.id,
            category = %event.category,
            session_id = %event.session_id,
            "analytics event ingested"
        );

        self.ingested.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("collector.ingested").increment(1);
        self.event_sink.emit(event);
    }

    /// Ingest a batch of events.
    pub fn ingest_batch(&self, events: Vec<AnalyticsEvent>) {
        info!(event_count = events.len(), "ingesting event batch");
        for event in events {
            self.ingest(event);
        }
    }

    /// Number of events ingested since startup.
    pub fn ingested_count(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    /// Get session metrics for a specific session.
    pub fn session_metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        self.session_metrics.get(session_id).map(|m| m.clone())
    }

    /// Get all session metrics.
    pub fn all_session_metrics(&self) -> Vec<SessionMetrics> {
        self.session_metrics
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
