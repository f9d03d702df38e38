mod config;

use clap::Parser;
use config::{CommonConfig, Config, ConfigError};
use enricher::caller::StaticCallers;
use enricher::config::ValidationError;
use enricher::documents::ConfigStore;
use enricher::runner::HttpRunner;
use enricher::service::ServiceError;
use enricher::{DispatchError, metrics_defs};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
enum CliCommand {
    /// Run the enriching gateway
    Run {
        #[arg(long)]
        config_path: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not build runner client: {0}")]
    Runner(#[from] DispatchError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

fn main() -> Result<(), CliError> {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Run { config_path } => {
            let config = Config::from_file(&config_path)?;
            config.enricher.validate()?;

            let _sentry = init_logging(&config.common);
            init_metrics(&config.common)?;

            tracing::info!(config = %config_path.display(), "starting enricher");
            run(config)
        }
    }
}

fn run(config: Config) -> Result<(), CliError> {
    let enricher_config = config.enricher;

    let store = Arc::new(ConfigStore::new(enricher_config.documents.clone()));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        // Readiness waits for the documents; a failed load is retried on first use
        if let Err(e) = store.snapshot().await {
            tracing::warn!(error = %e, "configuration documents not loaded");
        }

        let runner = Arc::new(HttpRunner::new(&enricher_config.runner)?);
        let callers = Arc::new(StaticCallers::new(&enricher_config.callers));
        enricher::run(enricher_config, store, runner, callers).await?;
        Ok::<(), CliError>(())
    })
}

fn init_logging(common: &CommonConfig) -> Option<sentry::ClientInitGuard> {
    let guard = common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(common: &CommonConfig) -> Result<(), CliError> {
    let Some(metrics_config) = &common.metrics else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
        .build(Some("enricher"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe(metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}
