//! API server — HTTP ingestion endpoints plus the Prometheus exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use folio_analytics::ConsentLedger;
use folio_core::config::AppConfig;
use folio_web_sdk::WebEventCollector;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Analytics ingestion
        .route("/api/analytics/events", post(rest::ingest_events))
        .route("/api/analytics/consent", post(rest::record_consent))
        .route(
            "/api/analytics/consent/:subject_id",
            get(rest::current_consent),
        )
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    collector: Arc<WebEventCollector>,
    ledger: Arc<ConsentLedger>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        collector: Arc<WebEventCollector>,
        ledger: Arc<ConsentLedger>,
    ) -> Self {
        Self {
            config,
            collector,
            ledger,
        }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            collector: self.collector.clone(),
            ledger: self.ledger.clone(),
            ingest: self.config.ingest.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        let app = router(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
