use crate::consent::ConsentLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed enumeration with a stable snake_case wire name per variant.
pub trait Enumerated: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == name)
    }
}

/// A value that should belong to a closed enumeration but arrived from an
/// untrusted source. Unrecognised names are kept verbatim so that they can be
/// reported by validation instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaybeKnown<T> {
    Known(T),
    Unknown(String),
}

impl<T: Enumerated> MaybeKnown<T> {
    pub fn parse(raw: &str) -> Self {
        match T::from_name(raw) {
            Some(v) => MaybeKnown::Known(v),
            None => MaybeKnown::Unknown(raw.to_string()),
        }
    }

    pub fn known(&self) -> Option<T> {
        match self {
            MaybeKnown::Known(v) => Some(*v),
            MaybeKnown::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MaybeKnown::Known(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            MaybeKnown::Known(v) => v.as_str(),
            MaybeKnown::Unknown(raw) => raw,
        }
    }
}

impl<T> Default for MaybeKnown<T> {
    fn default() -> Self {
        MaybeKnown::Unknown(String::new())
    }
}

impl<T> From<T> for MaybeKnown<T> {
    fn from(value: T) -> Self {
        MaybeKnown::Known(value)
    }
}

impl From<&str> for MaybeKnown<EventCategory> {
    fn from(raw: &str) -> Self {
        MaybeKnown::parse(raw)
    }
}

impl From<&str> for MaybeKnown<ConsentLevel> {
    fn from(raw: &str) -> Self {
        MaybeKnown::parse(raw)
    }
}

impl<T: Enumerated> fmt::Display for MaybeKnown<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of user or system action an event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    PageView,
    ProjectView,
    ProjectClick,
    ProjectFilter,
    ExternalLink,
    SocialClick,
    ResumeDownload,
    ContactFormSubmit,
    NewsletterSignup,
    NewsletterUnsubscribe,
    NewsletterConfirm,
    AuthSignIn,
    AuthSignOut,
    Search,
    ScrollDepth,
    TimeOnPage,
    ThemeToggle,
    Navigation,
    ConsentUpdate,
    ErrorOccurred,
    PerformanceMetric,
}

impl Enumerated for EventCategory {
    const ALL: &'static [Self] = &[
        EventCategory::PageView,
        EventCategory::ProjectView,
        EventCategory::ProjectClick,
        EventCategory::ProjectFilter,
        EventCategory::ExternalLink,
        EventCategory::SocialClick,
        EventCategory::ResumeDownload,
        EventCategory::ContactFormSubmit,
        EventCategory::NewsletterSignup,
        EventCategory::NewsletterUnsubscribe,
        EventCategory::NewsletterConfirm,
        EventCategory::AuthSignIn,
        EventCategory::AuthSignOut,
        EventCategory::Search,
        EventCategory::ScrollDepth,
        EventCategory::TimeOnPage,
        EventCategory::ThemeToggle,
        EventCategory::Navigation,
        EventCategory::ConsentUpdate,
        EventCategory::ErrorOccurred,
        EventCategory::PerformanceMetric,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            EventCategory::PageView => "page_view",
            EventCategory::ProjectView => "project_view",
            EventCategory::ProjectClick => "project_click",
            EventCategory::ProjectFilter => "project_filter",
            EventCategory::ExternalLink => "external_link",
            EventCategory::SocialClick => "social_click",
            EventCategory::ResumeDownload => "resume_download",
            EventCategory::ContactFormSubmit => "contact_form_submit",
            EventCategory::NewsletterSignup => "newsletter_signup",
            EventCategory::NewsletterUnsubscribe => "newsletter_unsubscribe",
            EventCategory::NewsletterConfirm => "newsletter_confirm",
            EventCategory::AuthSignIn => "auth_sign_in",
            EventCategory::AuthSignOut => "auth_sign_out",
            EventCategory::Search => "search",
            EventCategory::ScrollDepth => "scroll_depth",
            EventCategory::TimeOnPage => "time_on_page",
            EventCategory::ThemeToggle => "theme_toggle",
            EventCategory::Navigation => "navigation",
            EventCategory::ConsentUpdate => "consent_update",
            EventCategory::ErrorOccurred => "error_occurred",
            EventCategory::PerformanceMetric => "performance_metric",
        }
    }
}

impl EventCategory {
    /// Minimum consent level under which events of this category may be recorded.
    pub fn required_consent(&self) -> ConsentLevel {
        match self {
            EventCategory::ErrorOccurred
            | EventCategory::ConsentUpdate
            | EventCategory::AuthSignIn
            | EventCategory::AuthSignOut
            | EventCategory::NewsletterSignup
            | EventCategory::NewsletterUnsubscribe
            | EventCategory::NewsletterConfirm => ConsentLevel::Essential,
            _ => ConsentLevel::Analytics,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

/// Where an event happened. Copied into every event by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Page load time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_time: Option<u64>,
}

/// Device, browser and session counters at event creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserContext {
    pub device_type: DeviceType,
    pub screen_width: u32,
    pub screen_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: String,
    pub platform: String,
    pub language: String,
    pub timezone: String,
    pub session_page_views: u32,
    pub session_event_count: u32,
}

/// Category-specific event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    Project {
        project_id: String,
        #[serde(default)]
        project_title: Option<String>,
        #[serde(default)]
        technologies: Vec<String>,
    },
    Newsletter {
        source: String,
        success: bool,
    },
    Link {
        href: String,
        external: bool,
    },
    #[serde(rename_all = "camelCase")]
    Search {
        query: String,
        result_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    Scroll {
        depth_percent: u8,
    },
    Error {
        message: String,
        #[serde(default)]
        source: Option<String>,
        fatal: bool,
    },
    Performance {
        metric: String,
        value: f64,
        #[serde(default)]
        rating: Option<String>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Project { .. } => "project",
            EventPayload::Newsletter { .. } => "newsletter",
            EventPayload::Link { .. } => "link",
            EventPayload::Search { .. } => "search",
            EventPayload::Scroll { .. } => "scroll",
            EventPayload::Error { .. } => "error",
            EventPayload::Performance { .. } => "performance",
        }
    }

    /// Whether this payload may accompany an event of `category`.
    pub fn allows(&self, category: EventCategory) -> bool {
        use EventCategory as C;
        match self {
            EventPayload::Project { .. } => {
                matches!(category, C::ProjectView | C::ProjectClick | C::ProjectFilter)
            }
            EventPayload::Newsletter { .. } => matches!(
                category,
                C::NewsletterSignup | C::NewsletterUnsubscribe | C::NewsletterConfirm
            ),
            EventPayload::Link { .. } => matches!(
                category,
                C::ExternalLink | C::SocialClick | C::ResumeDownload | C::Navigation
            ),
            EventPayload::Search { .. } => matches!(category, C::Search | C::ProjectFilter),
            EventPayload::Scroll { .. } => category == C::ScrollDepth,
            EventPayload::Error { .. } => category == C::ErrorOccurred,
            EventPayload::Performance { .. } => {
                matches!(category, C::PerformanceMetric | C::TimeOnPage)
            }
        }
    }
}

/// One recorded user or system action.
///
/// Identity fields default to empty values on deserialization so that a
/// malformed inbound event reaches the validator and is reported field by
/// field rather than rejected wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(default)]
    pub id: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub category: MaybeKnown<EventCategory>,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub page: PageContext,
    #[serde(default)]
    pub user: UserContext,
    #[serde(default)]
    pub consent_level: MaybeKnown<ConsentLevel>,
    #[serde(default = "default_anonymized")]
    pub anonymized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

fn default_anonymized() -> bool {
    true
}

/// Batch wire format: `{ "events": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<AnalyticsEvent>,
}

/// Outcome of a validation pass. A failed validation is a value, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}
