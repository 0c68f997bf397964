//! Consent-gated tracking pipeline: check consent, create, validate, emit.

use chrono::Utc;
use folio_core::consent::ConsentRecord;
use folio_core::error::{AnalyticsError, AnalyticsResult};
use folio_core::event_bus::EventSink;
use folio_core::types::{AnalyticsEvent, EventCategory, PageContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::consent::{is_permitted, validate_consent};
use crate::factory::{EventFactory, EventOptions};
use crate::session::SessionContext;
use crate::validator::validate;

/// Tracks events for one session under its current consent record.
pub struct Tracker {
    factory: EventFactory,
    session: SessionContext,
    consent: ConsentRecord,
    sink: Arc<dyn EventSink>,
}

impl Tracker {
    pub fn new(session: SessionContext, consent: ConsentRecord, sink: Arc<dyn EventSink>) -> Self {
        Self {
            factory: EventFactory::new(),
            session,
            consent,
            sink,
        }
    }

    pub fn with_factory(mut self, factory: EventFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionContext {
        &mut self.session
    }

    pub fn consent(&self) -> &ConsentRecord {
        &self.consent
    }

    /// Replace the consent record. The previous record is not modified.
    pub fn update_consent(&mut self, record: ConsentRecord) -> AnalyticsResult<()> {
        let result = validate_consent(&record);
        if !result.valid {
            return Err(AnalyticsError::Consent(result.errors.join("; ")));
        }
        info!(
            session_id = %self.session.id(),
            from = %self.consent.level,
            to = %record.level,
            "Consent updated"
        );
        self.consent = record;
        Ok(())
    }

    /// Track an event. Returns `Ok(None)` when consent does not allow the
    /// category or the resulting event fails validation.
    pub fn track(
        &mut self,
        category: EventCategory,
        action: impl Into<String>,
        options: EventOptions,
    ) -> AnalyticsResult<Option<AnalyticsEvent>> {
        let required = category.required_consent();
        if !is_permitted(required, &self.consent) {
            metrics::counter!("tracker.suppressed").increment(1);
            debug!(
                category = %category,
                required = %required,
                granted = %self.consent.level,
                "Event suppressed by consent"
            );
            return Ok(None);
        }

        // Counters land in the session only once the event is emitted.
        let mut pending = self.session.clone();
        pending.touch(Utc::now());
        pending.record(category);

        let event =
            self.factory
                .create_event(&pending, category, action, self.consent.level, options)?;

        let result = validate(&event);
        if !result.valid {
            metrics::counter!("tracker.invalid").increment(1);
            warn!(event_id = %event.id, errors = ?result.errors, "Dropping invalid event");
            return Ok(None);
        }

        self.session = pending;
        metrics::counter!("tracker.emitted").increment(1);
        self.sink.emit(event.clone());
        Ok(Some(event))
    }

    /// Make `page` the session's current page and record a page view.
    pub fn track_page_view(
        &mut self,
        page: PageContext,
    ) -> AnalyticsResult<Option<AnalyticsEvent>> {
        self.session.set_page(page);
        self.track(EventCategory::PageView, "view", EventOptions::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use folio_core::consent::{ConsentLevel, ConsentMethod};
    use folio_core::event_bus::capture_sink;
    use folio_core::types::EventPayload;

    fn page(path: &str) -> PageContext {
        PageContext {
            path: path.into(),
            title: "Projects".into(),
            url: format!("https://example.com{path}"),
            ..Default::default()
        }
    }

    fn tracker(level: ConsentLevel) -> (Tracker, Arc<folio_core::event_bus::CaptureSink>) {
        let sink = capture_sink();
        let tracker = Tracker::new(
            SessionContext::with_id("sess-1", Duration::minutes(30)),
            ConsentRecord::new(level, ConsentMethod::BannerAccept),
            sink.clone() as Arc<dyn EventSink>,
        );
        (tracker, sink)
    }

    #[test]
    fn test_page_view_emitted_with_analytics_consent() {
        let (mut tracker, sink) = tracker(ConsentLevel::Analytics);
        let event = tracker.track_page_view(page("/projects")).unwrap().unwrap();

        assert_eq!(event.page.path, "/projects");
        assert_eq!(event.user.session_page_views, 1);
        assert!(!event.anonymized);
        assert_eq!(sink.count_category(EventCategory::PageView), 1);
    }

    #[test]
    fn test_essential_consent_suppresses_analytics_events() {
        let (mut tracker, sink) = tracker(ConsentLevel::Essential);
        assert!(tracker.track_page_view(page("/")).unwrap().is_none());

        let error = tracker
            .track(
                EventCategory::ErrorOccurred,
                "render",
                EventOptions::default().with_payload(EventPayload::Error {
                    message: "boom".into(),
                    source: None,
                    fatal: false,
                }),
            )
            .unwrap()
            .unwrap();
        assert!(error.anonymized);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_invalid_event_is_dropped() {
        let (mut tracker, sink) = tracker(ConsentLevel::Full);
        tracker.session_mut().set_page(page("/"));
        let dropped = tracker
            .track(
                EventCategory::PageView,
                "view",
                EventOptions::default().with_payload(EventPayload::Scroll { depth_percent: 10 }),
            )
            .unwrap();
        assert!(dropped.is_none());
        assert_eq!(sink.count(), 0);
        assert_eq!(tracker.session().event_count(), 0);
        assert_eq!(tracker.session().page_views(), 0);
    }

    #[test]
    fn test_dropped_events_do_not_inflate_session_counters() {
        let (mut tracker, sink) = tracker(ConsentLevel::Analytics);

        // No page yet, so the event has an empty path and fails validation.
        let early = tracker
            .track(EventCategory::ProjectClick, "open", EventOptions::default())
            .unwrap();
        assert!(early.is_none());
        assert_eq!(tracker.session().event_count(), 0);

        let view = tracker.track_page_view(page("/projects")).unwrap().unwrap();
        assert_eq!(view.user.session_event_count, 1);
        assert_eq!(view.user.session_page_views, 1);

        let click = tracker
            .track(EventCategory::ProjectClick, "open", EventOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(click.user.session_event_count, 2);
        assert_eq!(click.user.session_page_views, 1);
        assert_eq!(tracker.session().event_count(), 2);
        assert_eq!(sink.count(), 2);
    }

    struct NoIds;

    impl crate::factory::IdGenerator for NoIds {
        fn next_id(&self) -> AnalyticsResult<String> {
            Err(AnalyticsError::IdGeneration("no ids".into()))
        }
    }

    #[test]
    fn test_failed_construction_leaves_session_untouched() {
        let (tracker, sink) = tracker(ConsentLevel::Full);
        let mut tracker = tracker.with_factory(EventFactory::with_id_generator(Arc::new(NoIds)));

        assert!(tracker.track_page_view(page("/")).is_err());
        assert_eq!(tracker.session().event_count(), 0);
        assert_eq!(tracker.session().page_views(), 0);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_auto_essential_record_allows_only_essential_categories() {
        let sink = capture_sink();
        let mut tracker = Tracker::new(
            SessionContext::with_id("sess-2", Duration::minutes(30)),
            ConsentRecord::essential_only(),
            sink.clone() as Arc<dyn EventSink>,
        );
        assert_eq!(tracker.consent().method, ConsentMethod::AutoEssential);
        assert!(tracker.track_page_view(page("/")).unwrap().is_none());

        let newsletter = tracker
            .track(EventCategory::NewsletterSignup, "submit", EventOptions::default())
            .unwrap()
            .unwrap();
        assert!(newsletter.anonymized);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_consent_update_changes_gating() {
        let (mut tracker, sink) = tracker(ConsentLevel::Full);
        tracker.track_page_view(page("/")).unwrap().unwrap();

        let withdrawn = tracker.consent().withdrawn(ConsentMethod::SettingsUpdate);
        tracker.update_consent(withdrawn).unwrap();
        assert!(tracker.track_page_view(page("/about")).unwrap().is_none());
        assert_eq!(sink.count(), 1);

        let mut invalid =
            ConsentRecord::new(ConsentLevel::Analytics, ConsentMethod::SettingsUpdate);
        invalid.granular_consent.analytics = false;
        assert!(tracker.update_consent(invalid).is_err());
        assert_eq!(tracker.consent().level, ConsentLevel::Essential);
    }
}
