pub mod config;
pub mod consent;
pub mod error;
pub mod event_bus;
pub mod types;

pub use config::AppConfig;
pub use consent::{ConsentLevel, ConsentMethod, ConsentRecord, GranularConsent};
pub use error::{AnalyticsError, AnalyticsResult};
pub use types::{
    AnalyticsEvent, DeviceType, EventCategory, EventPayload, MaybeKnown, PageContext,
    UserContext, ValidationResult,
};
