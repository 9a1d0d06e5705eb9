use serde::Deserialize;
use std::env;
use thiserror::Error;
use url::Url;

/// Root domain admitted when no explicit extra origins match.
pub const DEFAULT_ROOT_DOMAIN: &str = "atra.io";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// How long browsers may cache a preflight decision, in seconds.
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86_400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("port cannot be 0")]
    InvalidPort,

    #[error("invalid value for {0}: {1}")]
    InvalidEnvValue(&'static str, String),

    #[error("invalid webhook_url: {0}")]
    InvalidWebhookUrl(String),

    #[error("webhook_url must be configured")]
    MissingWebhookUrl,

    #[error("root_domain cannot be empty")]
    EmptyRootDomain,
}

/// Ingress configuration, read once at startup and immutable afterwards
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for incoming beacon requests
    #[serde(default = "Listener::default")]
    pub listener: Listener,
    /// Root domain whose subdomains may post beacons cross-origin
    #[serde(default = "default_root_domain")]
    pub root_domain: String,
    /// Additional admitted origins or domains, beyond the root domain
    #[serde(default)]
    pub extra_origins: Vec<String>,
    /// Downstream webhook that receives every sanitized payload
    ///
    /// Optional at the type level so a config file can omit it, but
    /// `validate` rejects its absence: without a destination every
    /// forward would fail, and that should surface at startup.
    pub webhook_url: Option<Url>,
    /// Preflight cache lifetime advertised to browsers
    #[serde(default = "default_cors_max_age")]
    pub cors_max_age_secs: u64,
}

fn default_root_domain() -> String {
    DEFAULT_ROOT_DOMAIN.to_string()
}

fn default_cors_max_age() -> u64 {
    DEFAULT_CORS_MAX_AGE_SECS
}

impl Config {
    /// Builds the configuration from `BEACOND_*` environment variables.
    ///
    /// `BEACOND_EXTRA_ORIGINS` is a comma-separated list; empty entries
    /// are ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("BEACOND_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match env::var("BEACOND_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue("BEACOND_PORT", raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let root_domain =
            env::var("BEACOND_ROOT_DOMAIN").unwrap_or_else(|_| DEFAULT_ROOT_DOMAIN.to_string());

        let extra_origins = env::var("BEACOND_EXTRA_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let webhook_url = match env::var("BEACOND_WEBHOOK_URL") {
            Ok(raw) => Some(Url::parse(&raw).map_err(|e| {
                ConfigError::InvalidWebhookUrl(format!("{raw}: {e}"))
            })?),
            Err(_) => None,
        };

        let cors_max_age_secs = match env::var("BEACOND_CORS_MAX_AGE_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue("BEACOND_CORS_MAX_AGE_SECS", raw))?,
            Err(_) => DEFAULT_CORS_MAX_AGE_SECS,
        };

        Ok(Self {
            listener: Listener { host, port },
            root_domain,
            extra_origins,
            webhook_url,
            cors_max_age_secs,
        })
    }

    /// Validates the ingress configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;

        if self.root_domain.trim().is_empty() {
            return Err(ConfigError::EmptyRootDomain);
        }

        if self.webhook_url.is_none() {
            return Err(ConfigError::MissingWebhookUrl);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}
