//! Consumer Binary - standalone member of the processing consumer group.
//!
//! Reads upload events from the configured topic and checks each referenced
//! file. Several instances with distinct `CONSUMER_NAME`s share the topic.

use anyhow::{bail, Context};
use encore::adapters::Bus;
use encore::application::{EventConsumer, FileCheckProcessor};
use encore::shutdown::Shutdown;
use encore::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bus = Bus::from_url(&config.bus_url);
    if bus.is_in_process() {
        bail!("BUS_URL={} only works inside the server process; set EMBEDDED_CONSUMER=true there instead", config.bus_url);
    }

    let source = bus.source(
        &config.topic,
        &config.consumer_group,
        &config.consumer_name,
        config.claim_idle,
    );
    let consumer = EventConsumer::new(source, Arc::new(FileCheckProcessor));

    let stop = CancellationToken::new();
    let shutdown = Shutdown::install(stop.clone()).context("failed to install signal handlers")?;
    tokio::spawn(shutdown.wait());

    info!(
        topic = %config.topic,
        group = %config.consumer_group,
        consumer = %config.consumer_name,
        "starting consumer"
    );
    consumer.run(stop).await;
    Ok(())
}
