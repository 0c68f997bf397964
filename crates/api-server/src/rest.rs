//! REST API handlers for analytics ingestion, consent capture and
//! operational endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use folio_analytics::{validate, validate_consent, ConsentLedger};
use folio_core::config::IngestConfig;
use folio_core::consent::{ConsentLevel, ConsentRecord};
use folio_core::types::AnalyticsEvent;
use folio_web_sdk::WebEventCollector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<WebEventCollector>,
    pub ledger: Arc<ConsentLedger>,
    pub ingest: IngestConfig,
    pub node_id: String,
    pub start_time: Instant,
}

/// Body of `POST /api/analytics/events`: `{ "events": [...] }` or a single
/// event object. Elements stay raw JSON until each is decoded on its own.
#[derive(Debug)]
pub enum EventEnvelope {
    Batch(Vec<Value>),
    Single(Value),
}

impl EventEnvelope {
    /// Classify a request body. Any object carrying an `events` key is a batch.
    pub fn from_body(body: Value) -> Result<Self, String> {
        match body {
            Value::Object(mut map) if map.contains_key("events") => match map.remove("events") {
                Some(Value::Array(events)) => Ok(EventEnvelope::Batch(events)),
                _ => Err("events must be an array".to_string()),
            },
            single @ Value::Object(_) => Ok(EventEnvelope::Single(single)),
            _ => Err("body must be an event object or { \"events\": [...] }".to_string()),
        }
    }

    pub fn into_elements(self) -> Vec<Value> {
        match self {
            EventEnvelope::Batch(events) => events,
            EventEnvelope::Single(event) => vec![event],
        }
    }
}

/// Decode one element of a request body into an event.
fn decode_event(value: Value) -> Result<AnalyticsEvent, String> {
    serde_json::from_value(value).map_err(|e| format!("event could not be decoded: {e}"))
}

/// String fields longer than `max_len`, as violation messages.
fn oversized_fields(event: &AnalyticsEvent, max_len: usize) -> Vec<String> {
    [
        ("id", event.id.as_str()),
        ("sessionId", event.session_id.as_str()),
        ("action", event.action.as_str()),
        ("label", event.label.as_deref().unwrap_or_default()),
        ("page.path", event.page.path.as_str()),
        ("page.url", event.page.url.as_str()),
        ("page.title", event.page.title.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.len() > max_len)
    .map(|(field, _)| format!("{field} exceeds maximum length of {max_len}"))
    .collect()
}

/// POST /api/analytics/events — ingest one event or `{ "events": [...] }`.
///
/// Valid events are ingested, invalid ones are reported by index; the request
/// as a whole only fails when the batch is empty or too large.
pub async fn ingest_events(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<IngestResponse>), (StatusCode, Json<ErrorResponse>)> {
    let events = match EventEnvelope::from_body(body) {
        Ok(envelope) => envelope.into_elements(),
        Err(message) => {
            metrics::counter!("api.validation_errors").increment(1);
            return Err(bad_request("invalid_body", message));
        }
    };

    if events.is_empty() {
        metrics::counter!("api.validation_errors").increment(1);
        return Err(bad_request("empty_batch", "request contains no events".into()));
    }
    if events.len() > state.ingest.max_batch_size {
        metrics::counter!("api.validation_errors").increment(1);
        return Err(bad_request(
            "batch_too_large",
            format!(
                "batch of {} events exceeds maximum of {}",
                events.len(),
                state.ingest.max_batch_size
            ),
        ));
    }

    let mut accepted = 0usize;
    let mut rejected = Vec::new();
    for (index, element) in events.into_iter().enumerate() {
        let event = match decode_event(element) {
            Ok(event) => event,
            Err(message) => {
                warn!(index, error = %message, "Rejected undecodable analytics event");
                rejected.push(RejectedEvent {
                    index,
                    errors: vec![message],
                });
                continue;
            }
        };

        let mut errors = validate(&event).errors;
        errors.extend(oversized_fields(&event, state.ingest.max_field_len));

        if errors.is_empty() {
            state.collector.ingest(event);
            accepted += 1;
        } else {
            warn!(index, event_id = %event.id, errors = ?errors, "Rejected analytics event");
            rejected.push(RejectedEvent { index, errors });
        }
    }

    metrics::counter!("api.events_accepted").increment(accepted as u64);
    metrics::counter!("api.events_rejected").increment(rejected.len() as u64);

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            accepted,
            rejected: rejected.len(),
            errors: rejected,
        }),
    ))
}

/// POST /api/analytics/consent — append a consent record for a subject.
pub async fn record_consent(
    State(state): State<AppState>,
    Json(request): Json<ConsentRequest>,
) -> Result<(StatusCode, Json<ConsentResponse>), (StatusCode, Json<ErrorResponse>)> {
    if request.subject_id.is_empty() {
        return Err(bad_request("invalid_subject", "subjectId must not be empty".into()));
    }

    let result = validate_consent(&request.record);
    if !result.valid {
        metrics::counter!("api.consent_rejected").increment(1);
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "invalid_consent".to_string(),
                message: "consent record violates invariants".to_string(),
                details: result.errors,
            }),
        ));
    }

    let level = request.record.level;
    if let Err(e) = state.ledger.record(&request.subject_id, request.record) {
        error!(error = %e, subject = %request.subject_id, "Consent recording failed");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "consent_failed".to_string(),
                message: "Internal processing error".to_string(),
                details: Vec::new(),
            }),
        ));
    }

    info!(subject = %request.subject_id, level = %level, "Consent captured");
    metrics::counter!("api.consent_recorded").increment(1);

    Ok((
        StatusCode::CREATED,
        Json(ConsentResponse {
            history_len: state.ledger.history(&request.subject_id).len(),
            subject_id: request.subject_id,
            level,
        }),
    ))
}

/// GET /api/analytics/consent/:subject_id — current consent record.
pub async fn current_consent(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<ConsentRecord>, (StatusCode, Json<ErrorResponse>)> {
    state.ledger.current(&subject_id).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "consent_not_found".to_string(),
                message: format!("no consent recorded for '{subject_id}'"),
                details: Vec::new(),
            }),
        )
    })
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        ingested_events: state.collector.ingested_count(),
    })
}

/// GET /ready — Readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

fn bad_request(error: &str, message: String) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
            details: Vec::new(),
        }),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    #[serde(alias = "subject_id")]
    pub subject_id: String,
    pub record: ConsentRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentResponse {
    pub subject_id: String,
    pub level: ConsentLevel,
    pub history_len: usize,
}

#[derive(Debug, Serialize)]
pub struct RejectedEvent {
    pub index: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub errors: Vec<RejectedEvent>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub ingested_events: u64,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use folio_core::consent::ConsentMethod;
    use folio_core::types::EventBatch;
    use serde_json::json;

    fn state(max_batch_size: usize) -> AppState {
        AppState {
            collector: Arc::new(WebEventCollector::new()),
            ledger: Arc::new(ConsentLedger::new()),
            ingest: IngestConfig {
                max_batch_size,
                ..IngestConfig::default()
            },
            node_id: "test-node".into(),
            start_time: Instant::now(),
        }
    }

    fn event_json(id: &str, category: &str) -> serde_json::Value {
        json!({
            "id": id,
            "timestamp": 1_700_000_000_000i64,
            "sessionId": "sess-1",
            "category": category,
            "action": "view",
            "page": { "path": "/test", "title": "Test", "url": "https://example.com/test" },
            "user": { "deviceType": "desktop" },
            "consentLevel": "analytics",
            "anonymized": false
        })
    }

    fn envelope(value: serde_json::Value) -> Json<serde_json::Value> {
        Json(value)
    }

    #[test]
    fn test_envelope_shapes() {
        let single = EventEnvelope::from_body(event_json("e-1", "page_view")).unwrap();
        assert!(matches!(single, EventEnvelope::Single(_)));

        let batch =
            EventEnvelope::from_body(json!({ "events": [event_json("e-1", "page_view")] }))
                .unwrap();
        assert!(matches!(batch, EventEnvelope::Batch(_)));
        assert_eq!(batch.into_elements().len(), 1);

        assert!(EventEnvelope::from_body(json!({ "events": {} })).is_err());
        assert!(EventEnvelope::from_body(json!([event_json("e-1", "page_view")])).is_err());
    }

    #[tokio::test]
    async fn test_undecodable_element_is_rejected_by_index() {
        let state = state(10);
        let mut float_load_time = event_json("e-2", "page_view");
        float_load_time["page"]["loadTime"] = json!(123.4);
        let mut null_id = event_json("e-3", "page_view");
        null_id["id"] = json!(null);

        let (status, Json(body)) = ingest_events(
            State(state.clone()),
            envelope(json!({ "events": [
                event_json("e-1", "page_view"),
                float_load_time,
                null_id,
            ]})),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.accepted, 1);
        assert_eq!(body.rejected, 2);
        assert_eq!(body.errors[0].index, 1);
        assert_eq!(body.errors[0].errors.len(), 1);
        assert!(body.errors[0].errors[0].starts_with("event could not be decoded"));
        assert_eq!(body.errors[1].index, 2);
        assert_eq!(state.collector.ingested_count(), 1);
    }

    #[tokio::test]
    async fn test_ingest_serialized_event_batch() {
        let state = state(10);
        let events: Vec<AnalyticsEvent> = ["e-1", "e-2"]
            .into_iter()
            .map(|id| serde_json::from_value(event_json(id, "page_view")).unwrap())
            .collect();
        let body = serde_json::to_value(EventBatch { events }).unwrap();

        let (_, Json(response)) = ingest_events(State(state.clone()), envelope(body))
            .await
            .unwrap();
        assert_eq!(response.accepted, 2);
        assert_eq!(response.rejected, 0);
        assert_eq!(state.collector.ingested_count(), 2);
    }

    #[tokio::test]
    async fn test_non_array_events_is_bad_request() {
        let (status, Json(err)) = ingest_events(
            State(state(10)),
            envelope(json!({ "events": event_json("e-1", "page_view") })),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "invalid_body");
    }

    #[tokio::test]
    async fn test_ingest_single_event() {
        let state = state(10);
        let (status, Json(body)) = ingest_events(
            State(state.clone()),
            envelope(event_json("e-1", "page_view")),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.accepted, 1);
        assert_eq!(body.rejected, 0);
        assert_eq!(state.collector.ingested_count(), 1);
    }

    #[tokio::test]
    async fn test_ingest_batch_reports_invalid_by_index() {
        let state = state(10);
        let mut zero_ts = event_json("e-3", "page_view");
        zero_ts["timestamp"] = json!(0);

        let (_, Json(body)) = ingest_events(
            State(state.clone()),
            envelope(json!({ "events": [
                event_json("e-1", "page_view"),
                event_json("e-2", "bogus_category"),
                zero_ts,
            ]})),
        )
        .await
        .unwrap();

        assert_eq!(body.accepted, 1);
        assert_eq!(body.rejected, 2);
        assert_eq!(body.errors[0].index, 1);
        assert!(body.errors[0].errors[0].contains("category"));
        assert_eq!(body.errors[1].index, 2);
        assert!(body.errors[1].errors[0].contains("timestamp"));
        assert_eq!(
            state.collector.session_metrics("sess-1").unwrap().page_views,
            1
        );
    }

    #[tokio::test]
    async fn test_ingest_rejects_oversized_fields() {
        let mut state = state(10);
        state.ingest.max_field_len = 8;
        let mut event = event_json("e-1", "page_view");
        event["action"] = json!("a-very-long-action-name");

        let (_, Json(body)) = ingest_events(State(state), envelope(event)).await.unwrap();
        assert_eq!(body.accepted, 0);
        assert!(body.errors[0].errors.iter().any(|e| e.starts_with("action exceeds")));
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_and_oversized_batches() {
        let (status, Json(err)) = ingest_events(State(state(10)), envelope(json!({ "events": [] })))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "empty_batch");

        let events: Vec<_> = (0..3).map(|i| event_json(&format!("e-{i}"), "page_view")).collect();
        let (status, Json(err)) =
            ingest_events(State(state(2)), envelope(json!({ "events": events })))
                .await
                .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "batch_too_large");
    }

    #[tokio::test]
    async fn test_consent_round_trip() {
        let state = state(10);
        let request = ConsentRequest {
            subject_id: "visitor-1".into(),
            record: ConsentRecord::new(ConsentLevel::Analytics, ConsentMethod::BannerAccept),
        };
        let (status, Json(body)) = record_consent(State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.level, ConsentLevel::Analytics);
        assert_eq!(body.history_len, 1);

        let Json(current) = current_consent(State(state.clone()), Path("visitor-1".into()))
            .await
            .unwrap();
        assert_eq!(current.level, ConsentLevel::Analytics);

        let (status, _) = current_consent(State(state), Path("nobody".into()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_consent_violating_invariants_is_unprocessable() {
        let request: ConsentRequest = serde_json::from_value(json!({
            "subject_id": "visitor-2",
            "record": {
                "level": "marketing",
                "granular_consent": { "essential": true, "analytics": false },
                "method": "settings_update"
            }
        }))
        .unwrap();

        let state = state(10);
        let (status, Json(err)) = record_consent(State(state.clone()), Json(request))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.details[0].contains("analytics"));
        assert!(state.ledger.current("visitor-2").is_none());
    }
}
