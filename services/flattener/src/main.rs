use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use telemetry_core::{ObjectStore, S3ObjectStore};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xml_flattener::{Config, FlattenJob, LogFormat, ServiceConfig};

/// Flatten one day of raw XML telemetry into tables
#[derive(Debug, Parser)]
#[command(name = "xml-flattener", version)]
struct Args {
    /// Reading type, e.g. ACOUSTIC or WILD
    reading_type: String,
    year: i32,
    month: u32,
    day: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        "Starting XML flattener"
    );

    config.validate().context("Invalid configuration")?;
    let target = config
        .target(&args.reading_type, args.year, args.month, args.day)
        .context("Invalid job arguments")?;

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config.s3).await);
    let job = FlattenJob::new(store, config.job.clone(), target);

    let summary = job.run().await.context("Flattening failed")?;

    info!(
        batches = summary.batches,
        objects = summary.objects_downloaded,
        downloads_failed = summary.downloads_failed,
        messages = summary.messages,
        messages_skipped = summary.messages_skipped,
        rows = summary.rows_uploaded,
        uploads_failed = summary.uploads_failed,
        files = summary.uploaded_keys.len(),
        "Flattening finished"
    );

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(service: &ServiceConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&service.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match service.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}
