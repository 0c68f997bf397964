//! Consent model — decides whether tracking may proceed and whether new
//! events must be anonymized, plus an append-only ledger of consent records.

use dashmap::DashMap;
use folio_core::consent::{ConsentLevel, ConsentRecord};
use folio_core::error::{AnalyticsError, AnalyticsResult};
use folio_core::types::ValidationResult;
use tracing::{debug, info, warn};

/// True iff `record` grants at least `required`.
pub fn is_permitted(required: ConsentLevel, record: &ConsentRecord) -> bool {
    record.level >= required
}

/// Whether events captured under `level` must be anonymized.
///
/// Non-anonymized tracking starts at `analytics`.
pub fn anonymization_for(level: ConsentLevel) -> bool {
    level < ConsentLevel::Analytics
}

/// Check the invariants every stored consent record must satisfy.
pub fn validate_consent(record: &ConsentRecord) -> ValidationResult {
    let mut errors = Vec::new();
    let granular = &record.granular_consent;

    if !granular.essential {
        errors.push("granularConsent.essential must be true".to_string());
    }
    if record.level >= ConsentLevel::Analytics && !granular.analytics {
        errors.push(format!(
            "consent level '{}' requires granularConsent.analytics to be true",
            record.level
        ));
    }

    ValidationResult::from_errors(errors)
}

/// Append-only consent history keyed by subject (session or user id).
#[derive(Default)]
pub struct ConsentLedger {
    records: DashMap<String, Vec<ConsentRecord>>,
}

impl ConsentLedger {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Append a record for `subject`. Invalid records are rejected and the
    /// subject's history is left untouched.
    pub fn record(&self, subject: &str, record: ConsentRecord) -> AnalyticsResult<()> {
        let result = validate_consent(&record);
        if !result.valid {
            warn!(subject = subject, errors = ?result.errors, "Rejected invalid consent record");
            return Err(AnalyticsError::Consent(result.errors.join("; ")));
        }

        info!(
            subject = subject,
            level = %record.level,
            method = ?record.method,
            "Consent recorded"
        );
        self.records
            .entry(subject.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    /// The most recent record for `subject`.
    pub fn current(&self, subject: &str) -> Option<ConsentRecord> {
        self.records
            .get(subject)
            .and_then(|history| history.last().cloned())
    }

    /// Every record for `subject`, oldest first.
    pub fn history(&self, subject: &str) -> Vec<ConsentRecord> {
        self.records
            .get(subject)
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Without any record only operations requiring `none` are permitted.
    pub fn is_permitted(&self, subject: &str, required: ConsentLevel) -> bool {
        let permitted = match self.current(subject) {
            Some(record) => is_permitted(required, &record),
            None => required == ConsentLevel::None,
        };
        debug!(subject = subject, required = %required, permitted, "Consent check");
        permitted
    }

    pub fn subject_count(&self) -> usize {
        self.records.len()
    }
}
