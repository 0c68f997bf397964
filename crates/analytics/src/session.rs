//! Explicit browsing-session context.
//!
//! One `SessionContext` per visitor session. It owns the session id, rotates
//! it after an idle timeout, and keeps the page/user snapshot that events
//! copy when the caller supplies no context of its own.

use chrono::{DateTime, Duration, Utc};
use folio_core::config::SessionConfig;
use folio_core::types::{EventCategory, PageContext, UserContext};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionContext {
    id: String,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    timeout: Duration,
    page_views: u32,
    event_count: u32,
    page: PageContext,
    user: UserContext,
}

impl SessionContext {
    pub fn new(timeout: Duration) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), timeout)
    }

    pub fn with_id(id: impl Into<String>, timeout: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            started_at: now,
            last_activity: now,
            timeout,
            page_views: 0,
            event_count: 0,
            page: PageContext::default(),
            user: UserContext::default(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(Duration::seconds(config.timeout_secs as i64))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn page_views(&self) -> u32 {
        self.page_views
    }

    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity > self.timeout
    }

    /// Mark activity at `now`. An expired session is replaced by a fresh one
    /// with a new id and zeroed counters; returns true when that happened.
    pub fn touch(&mut self, now: DateTime<Utc>) -> bool {
        let rotated = self.is_expired_at(now);
        if rotated {
            let previous = std::mem::replace(&mut self.id, Uuid::new_v4().to_string());
            debug!(previous = %previous, session_id = %self.id, "Session expired, rotated id");
            self.started_at = now;
            self.page_views = 0;
            self.event_count = 0;
        }
        self.last_activity = now;
        rotated
    }

    /// Count an event recorded in this session.
    pub fn record(&mut self, category: EventCategory) {
        self.event_count += 1;
        if category == EventCategory::PageView {
            self.page_views += 1;
        }
    }

    pub fn set_page(&mut self, page: PageContext) {
        self.page = page;
    }

    pub fn set_user(&mut self, user: UserContext) {
        self.user = user;
    }

    /// Copy of the current page context.
    pub fn page_snapshot(&self) -> PageContext {
        self.page.clone()
    }

    /// Copy of the current user context with this session's counters filled in.
    pub fn user_snapshot(&self) -> UserContext {
        UserContext {
            session_page_views: self.page_views,
            session_event_count: self.event_count,
            ..self.user.clone()
        }
    }
}
