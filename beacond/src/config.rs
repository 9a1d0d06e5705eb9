use ingress::config::Config as IngressConfig;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

/// Top-level daemon configuration: the ingress settings plus optional
/// operational extras.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub metrics: Option<MetricsConfig>,
    pub ingress: IngressConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Environment fallback for deployments that don't mount a config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let ingress = IngressConfig::from_env()?;

        let metrics = match env::var("BEACOND_STATSD_HOST") {
            Ok(statsd_host) => {
                let statsd_port = match env::var("BEACOND_STATSD_PORT") {
                    Ok(raw) => raw
                        .parse()
                        .map_err(|_| ConfigError::InvalidStatsdPort(raw))?,
                    Err(_) => 8125,
                };
                Some(MetricsConfig {
                    statsd_host,
                    statsd_port,
                })
            }
            Err(_) => None,
        };

        Ok(Self { metrics, ingress })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error(transparent)]
    IngressError(#[from] ingress::config::ConfigError),
    #[error("invalid statsd port: {0}")]
    InvalidStatsdPort(String),
}
