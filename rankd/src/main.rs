mod config;

use aggregator::api::{AppState, ServeError};
use aggregator::upstream::{RankingSite, UpstreamError};
use clap::{Parser, Subcommand};
use config::{Config, ConfigError, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rankd", about = "Leaderboard aggregation and warm-up service")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "rankd.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve,
    /// Trigger the warm-up chain on a running instance
    Warm,
}

#[derive(thiserror::Error, Debug)]
enum RankdError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("serve error: {0}")]
    Serve(#[from] ServeError),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_statsd::StatsdError),

    #[error("metrics recorder already installed")]
    RecorderInstalled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> Result<(), RankdError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Keep the guard alive for the process lifetime.
    let _sentry_guard = config.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    if let Some(metrics_config) = &config.metrics {
        install_statsd(metrics_config)?;
    }
    shared::metrics_defs::describe_all(aggregator::metrics_defs::ALL_METRICS);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli.command, config))
}

fn install_statsd(config: &MetricsConfig) -> Result<(), RankdError> {
    let recorder = StatsdBuilder::from(&config.statsd_host, config.statsd_port)
        .build(Some("rankd"))?;
    metrics::set_global_recorder(recorder).map_err(|_| RankdError::RecorderInstalled)?;
    Ok(())
}

async fn run(command: Command, config: Config) -> Result<(), RankdError> {
    match command {
        Command::Serve => {
            let site = Arc::new(RankingSite::new(&config.upstream)?);
            let cache = aggregator::cache::from_config(&config.cache);
            let state = Arc::new(AppState::new(site, cache, config.warm.clone(), &config.cors));
            aggregator::api::serve(&config.listener, state).await?;
        }
        Command::Warm => {
            let url = format!(
                "http://{}:{}/api/growth-warm-start",
                config.listener.host, config.listener.port
            );
            let response = reqwest::Client::new().post(&url).send().await?;
            tracing::info!(status = %response.status(), "warm-up triggered");
            println!("{}", response.text().await?);
        }
    }
    Ok(())
}
