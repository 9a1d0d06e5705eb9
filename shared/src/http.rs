use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accept loop for a hyper service. Binds once, then serves each
/// connection on its own task with h1/h2 auto-detection.
pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "listening");
    let service_arc = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        tokio::spawn(async move {
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(%peer_addr, error = %err, "connection ended with error");
            }
        });
    }
}

/// Response body with no content, typed to the caller's error.
pub fn empty_body<E>() -> BoxBody<Bytes, E> {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// Response body from a static or owned chunk.
pub fn full_body<E>(chunk: impl Into<Bytes>) -> BoxBody<Bytes, E> {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

/// Builds a `{"error": reason}` JSON response with the given status.
pub fn json_error_response<E>(status: StatusCode, reason: &str) -> Response<BoxBody<Bytes, E>> {
    let body = serde_json::json!({ "error": reason }).to_string();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full_body(body))
        .unwrap_or_else(|_| {
            let mut res = Response::new(empty_body());
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            res
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[tokio::test]
    async fn test_json_error_response_shape() {
        let res = json_error_response::<Infallible>(StatusCode::BAD_REQUEST, "empty body");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, serde_json::json!({"error": "empty body"}));
    }

    #[tokio::test]
    async fn test_empty_body_collects_to_nothing() {
        let body = empty_body::<Infallible>();
        let bytes = body.collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}
