//! Event factory — turns a category, an action and optional context into a
//! complete [`AnalyticsEvent`].
//!
//! Construction is total over categories: an unrecognised category name is
//! stored as-is and left for the validator to reject.

use chrono::Utc;
use folio_core::consent::ConsentLevel;
use folio_core::error::{AnalyticsError, AnalyticsResult};
use folio_core::types::{
    AnalyticsEvent, EventCategory, EventPayload, MaybeKnown, PageContext, UserContext,
};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use crate::consent::anonymization_for;
use crate::session::SessionContext;

/// Source of event identifiers. Ids must not repeat within a process.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> AnalyticsResult<String>;
}

/// Random v4 UUIDs.
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> AnalyticsResult<String> {
        Ok(Uuid::new_v4().to_string())
    }
}

/// Optional parts of an event. Omitted page/user context is taken from the
/// session snapshot.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    pub label: Option<String>,
    pub value: Option<f64>,
    pub page: Option<PageContext>,
    pub user: Option<UserContext>,
    pub payload: Option<EventPayload>,
}

impl EventOptions {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_page(mut self, page: PageContext) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

pub struct EventFactory {
    ids: Arc<dyn IdGenerator>,
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFactory {
    pub fn new() -> Self {
        Self {
            ids: Arc::new(UuidGenerator),
        }
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// Build an event for `session`. Fails only when an id or a timestamp
    /// cannot be produced.
    pub fn create_event(
        &self,
        session: &SessionContext,
        category: impl Into<MaybeKnown<EventCategory>>,
        action: impl Into<String>,
        consent_level: ConsentLevel,
        options: EventOptions,
    ) -> AnalyticsResult<AnalyticsEvent> {
        let id = self.ids.next_id()?;
        if id.is_empty() {
            return Err(AnalyticsError::IdGeneration(
                "id generator returned an empty id".into(),
            ));
        }

        let timestamp = Utc::now().timestamp_millis();
        if timestamp <= 0 {
            return Err(AnalyticsError::Clock(format!(
                "system clock is before the Unix epoch ({timestamp} ms)"
            )));
        }

        let event = AnalyticsEvent {
            id,
            timestamp,
            session_id: session.id().to_string(),
            category: category.into(),
            action: action.into(),
            label: options.label,
            value: options.value,
            page: options.page.unwrap_or_else(|| session.page_snapshot()),
            user: options.user.unwrap_or_else(|| session.user_snapshot()),
            consent_level: consent_level.into(),
            anonymized: anonymization_for(consent_level),
            payload: options.payload,
        };

        trace!(
            event_id = %event.id,
            category = %event.category,
            session_id = %event.session_id,
            "Analytics event created"
        );

        Ok(event)
    }
}
