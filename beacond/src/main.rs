use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, ConfigError, MetricsConfig};

#[derive(Parser)]
#[command(name = "beacond", about = "Beacon collection ingress")]
struct Cli {
    /// Path to a YAML config file; BEACOND_* environment variables are
    /// used when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    // A missing webhook URL fails here, not on the first request
    if let Err(err) = config.ingress.validate() {
        tracing::error!(error = %err, "invalid configuration");
        return ExitCode::FAILURE;
    }

    if let Some(metrics_config) = &config.metrics {
        install_metrics(metrics_config);
    }

    if let Some(url) = &config.ingress.webhook_url {
        tracing::info!(
            webhook_host = url.host_str().unwrap_or_default(),
            root_domain = config.ingress.root_domain,
            "starting beacond"
        );
    }

    if let Err(err) = ingress::run(config.ingress).await {
        tracing::error!(error = %err, "ingress terminated");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

fn install_metrics(config: &MetricsConfig) {
    match StatsdBuilder::from(&config.statsd_host, config.statsd_port).build(Some("beacond")) {
        Ok(recorder) => {
            if let Err(err) = metrics::set_global_recorder(recorder) {
                tracing::warn!(error = %err, "metrics recorder already installed");
                return;
            }
            for def in ingress::metrics_defs::ALL_METRICS {
                tracing::debug!(name = def.name, kind = def.metric_type.as_str(), "metric defined");
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to set up statsd exporter, metrics disabled");
        }
    }
}
