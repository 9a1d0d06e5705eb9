use thiserror::Error;

/// Result type alias for ingress operations
pub type Result<T, E = IngressError> = std::result::Result<T, E>;

/// Errors that can terminate the ingress service or a connection
#[derive(Error, Debug)]
pub enum IngressError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("webhook_url is not configured")]
    MissingWebhookUrl,
}
