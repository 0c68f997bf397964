//! Privacy consent records.
//!
//! A consent record is never edited. Every change of preference produces a
//! new timestamped record so the full history can be audited.

use crate::types::Enumerated;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the privacy policy new records are captured against.
pub const CONSENT_POLICY_VERSION: &str = "1.0";

/// Overall tracking permission, ordered from least to most permissive.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ConsentLevel {
    #[default]
    None,
    Essential,
    Functional,
    Analytics,
    Marketing,
    Full,
}

impl Enumerated for ConsentLevel {
    const ALL: &'static [Self] = &[
        ConsentLevel::None,
        ConsentLevel::Essential,
        ConsentLevel::Functional,
        ConsentLevel::Analytics,
        ConsentLevel::Marketing,
        ConsentLevel::Full,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ConsentLevel::None => "none",
            ConsentLevel::Essential => "essential",
            ConsentLevel::Functional => "functional",
            ConsentLevel::Analytics => "analytics",
            ConsentLevel::Marketing => "marketing",
            ConsentLevel::Full => "full",
        }
    }
}

impl ConsentLevel {
    /// Position in the permissiveness order; `none` is 0.
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ConsentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a consent record was captured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMethod {
    BannerAccept,
    BannerReject,
    SettingsUpdate,
    AutoEssential,
    GdprRequest,
}

/// Per-purpose permissions. `essential` cannot be withdrawn while a record exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranularConsent {
    pub essential: bool,
    #[serde(default)]
    pub functional: bool,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub performance: bool,
    #[serde(default)]
    pub marketing: bool,
    #[serde(default)]
    pub personalization: bool,
    #[serde(default, alias = "third_party")]
    pub third_party: bool,
}

impl GranularConsent {
    /// The permissions a level grants on its own.
    pub fn for_level(level: ConsentLevel) -> Self {
        let at_least = |floor: ConsentLevel| level >= floor;
        Self {
            essential: true,
            functional: at_least(ConsentLevel::Functional),
            personalization: at_least(ConsentLevel::Functional),
            analytics: at_least(ConsentLevel::Analytics),
            performance: at_least(ConsentLevel::Analytics),
            marketing: at_least(ConsentLevel::Marketing),
            third_party: at_least(ConsentLevel::Full),
        }
    }
}

/// A user's privacy consent at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    pub level: ConsentLevel,
    #[serde(alias = "granular_consent")]
    pub granular_consent: GranularConsent,
    pub method: ConsentMethod,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn default_version() -> String {
    CONSENT_POLICY_VERSION.to_string()
}

impl ConsentRecord {
    pub fn new(level: ConsentLevel, method: ConsentMethod) -> Self {
        Self {
            level,
            granular_consent: GranularConsent::for_level(level),
            method,
            timestamp: Utc::now(),
            version: default_version(),
        }
    }

    /// Record granted automatically before the visitor has answered the banner.
    pub fn essential_only() -> Self {
        Self::new(ConsentLevel::Essential, ConsentMethod::AutoEssential)
    }

    /// A new record replacing this one at `level`.
    pub fn revised(&self, level: ConsentLevel, method: ConsentMethod) -> Self {
        Self {
            version: self.version.clone(),
            ..Self::new(level, method)
        }
    }

    /// A new record withdrawing everything but essential consent.
    pub fn withdrawn(&self, method: ConsentMethod) -> Self {
        self.revised(ConsentLevel::Essential, method)
    }
}
