pub mod config;
pub mod cors;
pub mod errors;
pub mod forward;
pub mod metrics_defs;
pub mod origin;
pub mod payload;
pub mod service;

#[cfg(test)]
mod testutils;

pub use errors::IngressError;

use crate::service::CollectorService;

/// Builds the collector service from validated configuration and runs
/// the accept loop until the listener fails or the process stops.
pub async fn run(config: config::Config) -> Result<(), IngressError> {
    let service = CollectorService::new(&config)?;
    shared::http::run_http_service(&config.listener.host, config.listener.port, service).await
}
