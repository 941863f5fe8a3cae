//! Server Binary - HTTP upload endpoints
//!
//! Wires up:
//! - Local storage for uploaded files
//! - Message bus (Redis Streams, or in-process with `BUS_URL=memory://`)
//! - JSON API under `/api` and the upload form at `/`
//! - Optionally, the event consumer in the same process

use anyhow::Context;
use encore::adapters::{fs::LocalStorage, http, Bus};
use encore::application::{EventConsumer, EventPublisher, FileCheckProcessor, IngestService};
use encore::shutdown::Shutdown;
use encore::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Adapters
    let storage = LocalStorage::init(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create upload directory {}", config.upload_dir))?;
    let bus = Bus::from_url(&config.bus_url).with_stream_max_len(config.stream_max_len);

    // 2. Application services
    let publisher = EventPublisher::new(bus.producer(), &config.topic);
    if !publisher.is_connected().await {
        warn!(bus_url = %config.bus_url, "message bus unreachable, uploads will not be announced until it is back");
    }
    let ingest = IngestService::new(config.validator(), storage, publisher.clone());

    // 3. Embedded consumer
    let stop = CancellationToken::new();
    let consumer = if config.embedded_consumer || bus.is_in_process() {
        let source = bus.source(
            &config.topic,
            &config.consumer_group,
            &config.consumer_name,
            config.claim_idle,
        );
        let consumer = EventConsumer::new(source, Arc::new(FileCheckProcessor));
        let token = stop.clone();
        info!(group = %config.consumer_group, consumer = %config.consumer_name, "starting embedded consumer");
        Some(tokio::spawn(async move { consumer.run(token).await }))
    } else {
        None
    };

    // 4. HTTP
    let app = http::router(http::AppState::new(ingest));
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), topic = %config.topic, "listening");

    let shutdown = Shutdown::install(stop.clone()).context("failed to install signal handlers")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
        .context("server failed")?;

    // 5. Teardown
    stop.cancel();
    if let Some(handle) = consumer {
        if let Err(e) = handle.await {
            warn!(error = %e, "embedded consumer ended abnormally");
        }
    }
    publisher.close().await;
    Ok(())
}
