//! Event validation. Every check runs; violations are collected in order and
//! reported as a value instead of an error.

use folio_core::types::{AnalyticsEvent, ValidationResult};

/// Validate a single event.
pub fn validate(event: &AnalyticsEvent) -> ValidationResult {
    let mut errors = Vec::new();

    if event.id.is_empty() {
        errors.push("id must be a non-empty string".to_string());
    }
    if event.timestamp <= 0 {
        errors.push(format!(
            "timestamp must be a positive number, got {}",
            event.timestamp
        ));
    }
    if event.session_id.is_empty() {
        errors.push("sessionId must be a non-empty string".to_string());
    }
    if !event.category.is_known() {
        errors.push(format!("category '{}' is not a valid event category", event.category));
    }
    if event.action.is_empty() {
        errors.push("action must be a non-empty string".to_string());
    }
    if event.page.path.is_empty() {
        errors.push("page.path must be a non-empty string".to_string());
    }
    if !event.consent_level.is_known() {
        errors.push(format!(
            "consentLevel '{}' is not a valid consent level",
            event.consent_level
        ));
    }
    if let (Some(payload), Some(category)) = (&event.payload, event.category.known()) {
        if !payload.allows(category) {
            errors.push(format!(
                "payload kind '{}' is not allowed for category '{}'",
                payload.kind(),
                category
            ));
        }
    }

    ValidationResult::from_errors(errors)
}

/// Validate each event of a batch, returning results in input order.
pub fn validate_batch(events: &[AnalyticsEvent]) -> Vec<ValidationResult> {
    events.iter().map(validate).collect()
}
