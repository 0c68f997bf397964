//! Folio analytics server — ingests portfolio-site analytics events and
//! consent records.
//!
//! Main entry point that initializes all subsystems and starts the server.

use clap::Parser;
use folio_analytics::{AnalyticsLogger, ConsentLedger};
use folio_api::ApiServer;
use folio_core::config::AppConfig;
use folio_core::event_bus::{noop_sink, EventSink};
use folio_web_sdk::WebEventCollector;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "folio-server")]
#[command(about = "Analytics event and consent ingestion for the portfolio site")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "FOLIO_ANALYTICS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "FOLIO_ANALYTICS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Maximum events accepted per request (overrides config)
    #[arg(long, env = "FOLIO_ANALYTICS__INGEST__MAX_BATCH_SIZE")]
    max_batch_size: Option<usize>,

    /// Skip ClickHouse and keep events in memory only
    #[arg(long, default_value_t = false)]
    no_storage: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "folio_server=info,folio_analytics=info,tower_http=info".into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Folio analytics server starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(max) = cli.max_batch_size {
        config.ingest.max_batch_size = max;
    }
    if cli.no_storage {
        config.clickhouse.enabled = false;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        max_batch_size = config.ingest.max_batch_size,
        storage = config.clickhouse.enabled,
        "Configuration loaded"
    );

    // Storage sink: ClickHouse when enabled and reachable, otherwise discard
    let sink: Arc<dyn EventSink> = if config.clickhouse.enabled {
        match AnalyticsLogger::new(&config.clickhouse).await {
            Ok(logger) => Arc::new(logger),
            Err(e) => {
                error!(error = %e, "Failed to connect to ClickHouse, events will not be stored");
                noop_sink()
            }
        }
    } else {
        info!("ClickHouse storage disabled");
        noop_sink()
    };

    let collector = Arc::new(WebEventCollector::new().with_event_sink(sink));
    let ledger = Arc::new(ConsentLedger::new());

    let api_server = ApiServer::new(config.clone(), collector, ledger);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Folio analytics server is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
