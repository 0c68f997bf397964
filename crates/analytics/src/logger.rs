//! Asynchronous analytics logger that batches events and writes to ClickHouse.
//! Uses a channel-based architecture for non-blocking event submission.

use clickhouse::Row;
use folio_core::config::ClickHouseConfig;
use folio_core::error::{AnalyticsError, AnalyticsResult};
use folio_core::event_bus::EventSink;
use folio_core::types::AnalyticsEvent;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Analytics logger with background batch writer.
pub struct AnalyticsLogger {
    sender: mpsc::Sender<AnalyticsEvent>,
}

impl AnalyticsLogger {
    /// Create a new analytics logger and spawn the background writer.
    pub async fn new(config: &ClickHouseConfig) -> AnalyticsResult<Self> {
        let (sender, receiver) = mpsc::channel::<AnalyticsEvent>(100_000);

        let writer = BatchWriter::new(config)
            .await
            .map_err(|e| AnalyticsError::Storage(e.to_string()))?;
        let batch_size = config.batch_size;
        let flush_interval = std::time::Duration::from_millis(config.flush_interval_ms);

        // Spawn background batch writer
        tokio::spawn(async move {
            writer.run(receiver, batch_size, flush_interval).await;
        });

        info!("Analytics logger initialized with ClickHouse backend");

        Ok(Self { sender })
    }

    /// Queue an event for storage (non-blocking). Events are dropped when the
    /// queue is full.
    pub fn log_event(&self, event: AnalyticsEvent) {
        if let Err(e) = self.sender.try_send(event) {
            metrics::counter!("analytics.dropped").increment(1);
            warn!("Analytics event dropped: {}", e);
        } else {
            metrics::counter!("analytics.queued").increment(1);
        }
    }
}

impl EventSink for AnalyticsLogger {
    fn emit(&self, event: AnalyticsEvent) {
        self.log_event(event);
    }
}

/// Flat storage row. Anonymized events lose everything that could identify
/// the visitor beyond the coarse device class.
#[derive(Debug, Row, Serialize, PartialEq)]
struct EventRow {
    id: String,
    timestamp_ms: i64,
    session_id: String,
    category: String,
    action: String,
    label: Option<String>,
    value: Option<f64>,
    page_path: String,
    page_title: String,
    referrer: Option<String>,
    query: Option<String>,
    load_time_ms: Option<u64>,
    device_type: String,
    browser: Option<String>,
    platform: Option<String>,
    language: Option<String>,
    timezone: Option<String>,
    screen_width: Option<u32>,
    screen_height: Option<u32>,
    consent_level: String,
    anonymized: u8,
    payload: Option<String>,
}

impl EventRow {
    fn from_event(event: &AnalyticsEvent) -> Self {
        let keep =
            |value: &str| (!event.anonymized && !value.is_empty()).then(|| value.to_string());
        let user = &event.user;
        Self {
            id: event.id.clone(),
            timestamp_ms: event.timestamp,
            session_id: event.session_id.clone(),
            category: event.category.as_str().to_string(),
            action: event.action.clone(),
            label: event.label.clone(),
            value: event.value,
            page_path: event.page.path.clone(),
            page_title: event.page.title.clone(),
            referrer: event.page.referrer.as_deref().and_then(keep),
            query: event.page.query.as_deref().and_then(keep),
            load_time_ms: event.page.load_time,
            device_type: serde_json::to_value(user.device_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            browser: keep(user.browser.as_str()),
            platform: keep(user.platform.as_str()),
            language: keep(user.language.as_str()),
            timezone: keep(user.timezone.as_str()),
            screen_width: (!event.anonymized).then_some(user.screen_width),
            screen_height: (!event.anonymized).then_some(user.screen_height),
            consent_level: event.consent_level.as_str().to_string(),
            anonymized: u8::from(event.anonymized),
            payload: event
                .payload
                .as_ref()
                .and_then(|p| serde_json::to_string(p).ok()),
        }
    }
}

/// Background writer that batches events and flushes to ClickHouse.
struct BatchWriter {
    client: clickhouse::Client,
}

impl BatchWriter {
    async fn new(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        // Create the events table if it doesn't exist
        Self::ensure_schema(&client, config.retention_days).await?;

        Ok(Self { client })
    }

    async fn ensure_schema(client: &clickhouse::Client, retention_days: u32) -> anyhow::Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS analytics_events (
                id String,
                timestamp_ms Int64,
                event_time DateTime64(3) MATERIALIZED fromUnixTimestamp64Milli(timestamp_ms),
                session_id String,
                category LowCardinality(String),
                action String,
                label Nullable(String),
                value Nullable(Float64),
                page_path String,
                page_title String,
                referrer Nullable(String),
                query Nullable(String),
                load_time_ms Nullable(UInt64),
                device_type LowCardinality(String),
                browser Nullable(String),
                platform Nullable(String),
                language Nullable(String),
                timezone Nullable(String),
                screen_width Nullable(UInt32),
                screen_height Nullable(UInt32),
                consent_level LowCardinality(String),
                anonymized UInt8,
                payload Nullable(String)
            ) ENGINE = MergeTree()
            ORDER BY (event_time, category, session_id)
            PARTITION BY toYYYYMM(event_time)
            TTL toDateTime(event_time) + INTERVAL {retention_days} DAY"
        );
        client.query(&ddl).execute().await?;

        info!("ClickHouse schema verified");
        Ok(())
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<AnalyticsEvent>,
        batch_size: usize,
        flush_interval: std::time::Duration,
    ) {
        let mut buffer: Vec<AnalyticsEvent> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            self.flush(&mut buffer).await;
                        }
                        info!("Analytics channel closed, batch writer stopping");
                        return;
                    }
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<AnalyticsEvent>) {
        let count = buffer.len();
        debug!(count = count, "Flushing analytics batch to ClickHouse");

        match self.insert_rows(buffer).await {
            Ok(()) => {
                metrics::counter!("analytics.flushed").increment(count as u64);
                debug!(count = count, "Analytics batch flushed successfully");
            }
            Err(e) => {
                metrics::counter!("analytics.flush_errors").increment(1);
                error!(error = %e, count = count, "Failed to flush analytics batch");
            }
        }

        buffer.clear();
    }

    async fn insert_rows(&self, events: &[AnalyticsEvent]) -> clickhouse::error::Result<()> {
        let mut insert = self.client.insert::<EventRow>("analytics_events")?;
        for event in events {
            insert.write(&EventRow::from_event(event)).await?;
        }
        insert.end().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use folio_core::consent::ConsentLevel;
    use folio_core::types::{DeviceType, EventCategory, PageContext, UserContext};

    fn event(anonymized: bool) -> AnalyticsEvent {
        AnalyticsEvent {
            id: "evt-1".into(),
            timestamp: 1_700_000_000_000,
            session_id: "sess-1".into(),
            category: EventCategory::PageView.into(),
            action: "view".into(),
            label: None,
            value: None,
            page: PageContext {
                path: "/blog".into(),
                title: "Blog".into(),
                url: "https://example.com/blog?ref=x".into(),
                referrer: Some("https://news.ycombinator.com/".into()),
                query: Some("ref=x".into()),
                ..Default::default()
            },
            user: UserContext {
                device_type: DeviceType::Mobile,
                browser: "Safari".into(),
                platform: "iOS".into(),
                language: "en-GB".into(),
                timezone: "Europe/London".into(),
                screen_width: 390,
                screen_height: 844,
                ..Default::default()
            },
            consent_level: if anonymized {
                ConsentLevel::Essential.into()
            } else {
                ConsentLevel::Analytics.into()
            },
            anonymized,
            payload: None,
        }
    }

    #[test]
    fn test_row_keeps_context_when_not_anonymized() {
        let row = EventRow::from_event(&event(false));
        assert_eq!(row.category, "page_view");
        assert_eq!(row.device_type, "mobile");
        assert_eq!(row.browser.as_deref(), Some("Safari"));
        assert_eq!(row.referrer.as_deref(), Some("https://news.ycombinator.com/"));
        assert_eq!(row.screen_width, Some(390));
        assert_eq!(row.anonymized, 0);
    }

    #[test]
    fn test_row_strips_identifying_context_when_anonymized() {
        let row = EventRow::from_event(&event(true));
        assert_eq!(row.device_type, "mobile");
        assert_eq!(row.page_path, "/blog");
        assert!(row.browser.is_none());
        assert!(row.language.is_none());
        assert!(row.referrer.is_none());
        assert!(row.query.is_none());
        assert!(row.screen_width.is_none());
        assert_eq!(row.anonymized, 1);
    }

    #[test]
    fn test_row_serializes_flat_columns() {
        let row = serde_json::to_value(EventRow::from_event(&event(true))).unwrap();
        assert_eq!(row["consent_level"], "essential");
        assert_eq!(row["timestamp_ms"], 1_700_000_000_000i64);
        assert!(row["payload"].is_null());
    }
}
