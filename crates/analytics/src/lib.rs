//! Analytics event and consent core.
//!
//! - [`consent`] — permission checks, anonymization policy, consent ledger
//! - [`validator`] — field-by-field event validation
//! - [`session`] — explicit session context owning the session id
//! - [`factory`] — builds events with fresh ids and consent-derived flags
//! - [`tracker`] — consent-gated create → validate → emit pipeline
//! - [`logger`] — batched ClickHouse writer

pub mod consent;
pub mod factory;
pub mod logger;
pub mod session;
pub mod tracker;
pub mod validator;

pub use consent::{anonymization_for, is_permitted, validate_consent, ConsentLedger};
pub use factory::{EventFactory, EventOptions, IdGenerator, UuidGenerator};
pub use logger::AnalyticsLogger;
pub use session::SessionContext;
pub use tracker::Tracker;
pub use validator::{validate, validate_batch};
