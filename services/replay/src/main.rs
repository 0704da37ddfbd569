use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use telemetry_core::{ObjectStore, ReplayPacer, S3ObjectStore};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xml_replay::{Config, KafkaPublisher, LogFormat, S3ReplaySource, ServiceConfig, SourceSettings};

/// Replay captured XML telemetry to a Kafka topic at its captured cadence
#[derive(Debug, Parser)]
#[command(name = "xml-replay", version)]
struct Args {
    /// Reading type to replay; also the partition key
    reading_type: Option<String>,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long)]
    month: Option<u32>,
    /// Days of the month in increasing order, comma separated
    #[arg(long, value_delimiter = ',')]
    days: Option<Vec<u32>>,
    /// Restart from the first day after the last one
    #[arg(long)]
    cycle: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load().context("Failed to load configuration")?;
    apply_args(&mut config, args);

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        reading_type = %config.replay.reading_type,
        "Starting XML replay producer"
    );

    config.validate().context("Invalid configuration")?;

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config.s3).await);
    let settings = SourceSettings {
        source_root: config.replay.source_root.clone(),
        reading_type: config.replay.reading_type.clone(),
        days: config.replay.dates().context("Invalid replay days")?,
        cycle: config.replay.cycle,
        download_concurrency: config.replay.download_concurrency,
    };
    let mut source = S3ReplaySource::new(store, settings);

    let publisher =
        KafkaPublisher::new(&config.stream).context("Failed to initialize Kafka producer")?;
    let mut pacer = ReplayPacer::new(
        publisher,
        config.stream.stream_name.clone(),
        config.replay.reading_type.clone(),
    );

    tokio::select! {
        result = pacer.run(&mut source) => {
            let stats = result.context("Replay failed")?;
            info!(
                batches_published = stats.batches_published,
                records_delivered = stats.records_delivered,
                records_failed = stats.records_failed,
                "Replay producer stopped"
            );
        }
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl+C signal, stopping replay");
        }
    }

    Ok(())
}

fn apply_args(config: &mut Config, args: Args) {
    if let Some(reading_type) = args.reading_type {
        config.replay.reading_type = reading_type;
    }
    if let Some(year) = args.year {
        config.replay.year = year;
    }
    if let Some(month) = args.month {
        config.replay.month = month;
    }
    if let Some(days) = args.days {
        config.replay.days = days;
    }
    if args.cycle {
        config.replay.cycle = true;
    }
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
