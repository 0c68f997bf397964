//! Web SDK server-side support — page/device context derivation from what the
//! browser reports, and ingestion of validated events with per-session
//! metrics.
//!
//! # Modules
//!
//! - [`context`] — builds `PageContext`/`UserContext` from URLs and client hints
//! - [`collector`] — event collector wired into the event sink

pub mod collector;
pub mod context;

pub use collector::{SessionMetrics, WebEventCollector};
pub use context::{page_context, user_context, ClientHints};
