//! Request handling for the collection endpoints.
//!
//! One service handles the whole surface: health probes, CORS preflight,
//! and the beacon collection flow (admission, body coercion, validation,
//! webhook forwarding). Shared state is immutable after construction, so
//! concurrent requests only contend on the HTTP client's connection pool.

use crate::config::Config;
use crate::cors;
use crate::errors::IngressError;
use crate::forward::Forwarder;
use crate::metrics_defs::{ORIGIN_REJECTED, PAYLOAD_REJECTED, REQUESTS_TOTAL};
use crate::origin::AdmissionPolicy;
use crate::payload::{self, MAX_BODY_BYTES};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue, ORIGIN};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{empty_body, full_body, json_error_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// hyper service for the beacon collection surface
#[derive(Clone)]
pub struct CollectorService {
    inner: Arc<Inner>,
}

struct Inner {
    policy: AdmissionPolicy,
    forwarder: Forwarder,
    cors_max_age_secs: u64,
}

impl CollectorService {
    pub fn new(config: &Config) -> Result<Self, IngressError> {
        let webhook_url = config
            .webhook_url
            .clone()
            .ok_or(IngressError::MissingWebhookUrl)?;

        Ok(Self {
            inner: Arc::new(Inner {
                policy: AdmissionPolicy::new(&config.root_domain, &config.extra_origins),
                forwarder: Forwarder::new(webhook_url),
                cors_max_age_secs: config.cors_max_age_secs,
            }),
        })
    }

    /// Handles one request. Generic over the body type so tests can drive
    /// it with in-memory bodies instead of `Incoming`.
    pub async fn handle<B>(
        &self,
        req: Request<B>,
    ) -> Result<Response<BoxBody<Bytes, IngressError>>, IngressError>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let request_id = short_request_id();
        let origin = req.headers().get(ORIGIN).cloned();

        // A present but non-ASCII Origin is unparseable, not absent
        let origin_str = match &origin {
            Some(value) => match value.to_str() {
                Ok(s) => Some(s.to_owned()),
                Err(_) => {
                    tracing::warn!(request_id, "origin header is not readable, denying");
                    shared::counter!(ORIGIN_REJECTED).increment(1);
                    return Ok(count_response(cors::denied_response()));
                }
            },
            None => None,
        };

        let admitted = self.inner.policy.admits(origin_str.as_deref());

        if req.method() == Method::OPTIONS {
            if !admitted {
                tracing::warn!(
                    request_id,
                    origin = origin_str.as_deref().unwrap_or_default(),
                    "preflight denied"
                );
                shared::counter!(ORIGIN_REJECTED).increment(1);
                return Ok(count_response(cors::denied_response()));
            }

            let res = match &origin {
                Some(value) => cors::preflight_response(value, self.inner.cors_max_age_secs),
                // Same-origin OPTIONS: nothing to negotiate
                None => {
                    let mut res = Response::new(empty_body());
                    *res.status_mut() = StatusCode::NO_CONTENT;
                    res
                }
            };
            return Ok(count_response(res));
        }

        if !admitted {
            tracing::warn!(
                request_id,
                origin = origin_str.as_deref().unwrap_or_default(),
                "origin denied"
            );
            shared::counter!(ORIGIN_REJECTED).increment(1);
            return Ok(count_response(cors::denied_response()));
        }

        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let mut response = if method == Method::GET && path == "/healthz" {
            text_response(StatusCode::OK, "ok")
        } else if method == Method::GET && path == "/" {
            text_response(StatusCode::OK, "beacond collector is running\n")
        } else if method == Method::POST && (path == "/" || path == "/collect") {
            self.collect(req, &request_id).await
        } else {
            tracing::debug!(request_id, %method, path, "no route matched");
            text_response(StatusCode::NOT_FOUND, "not found\n")
        };

        // Admitted cross-origin callers need the echo on actual responses too
        if let Some(value) = &origin {
            cors::apply_cors_headers(response.headers_mut(), value);
        }

        Ok(count_response(response))
    }

    async fn collect<B>(&self, req: Request<B>, request_id: &str) -> CollectorResponse
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let limited = Limited::new(req.into_body(), MAX_BODY_BYTES);
        let bytes = match limited.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                return if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    tracing::warn!(request_id, limit = MAX_BODY_BYTES, "request body over limit");
                    json_error_response(StatusCode::PAYLOAD_TOO_LARGE, "body too large")
                } else {
                    tracing::warn!(request_id, error = %err, "failed to read request body");
                    json_error_response(StatusCode::BAD_REQUEST, "invalid body")
                };
            }
        };

        let coerced = payload::coerce_body(&bytes, content_type.as_deref());

        // Fixed ordering: coerce, then the empty check, then validation
        if coerced.as_object().is_some_and(|map| map.is_empty()) {
            tracing::warn!(request_id, "empty body");
            shared::counter!(PAYLOAD_REJECTED).increment(1);
            return json_error_response(StatusCode::BAD_REQUEST, "empty body");
        }

        let sanitized = match payload::validate_and_sanitize(&coerced) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(request_id, reason = %err, "payload rejected");
                shared::counter!(PAYLOAD_REJECTED).increment(1);
                return json_error_response(StatusCode::BAD_REQUEST, &err.to_string());
            }
        };

        match self.inner.forwarder.send(&sanitized).await {
            Ok(status) if status.is_success() => {
                tracing::debug!(request_id, status = status.as_u16(), "event forwarded");
                // sendBeacon callers expect success with no body
                let mut res = Response::new(empty_body());
                *res.status_mut() = StatusCode::NO_CONTENT;
                res
            }
            Ok(status) => {
                tracing::error!(request_id, status = status.as_u16(), "webhook rejected event");
                gateway_error_response(Some(status))
            }
            Err(err) => {
                // Details stay in the logs; the caller gets a generic reason
                tracing::error!(request_id, error = %err, "forwarding failed");
                gateway_error_response(None)
            }
        }
    }
}

type CollectorResponse = Response<BoxBody<Bytes, IngressError>>;

impl Service<Request<Incoming>> for CollectorService {
    type Response = CollectorResponse;
    type Error = IngressError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let svc = self.clone();
        Box::pin(async move { svc.handle(req).await })
    }
}

fn short_request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn text_response(status: StatusCode, body: &'static str) -> CollectorResponse {
    let mut res = Response::new(full_body(body));
    *res.status_mut() = status;
    res
}

/// 502 toward the caller; carries the downstream status only when one
/// was actually received.
fn gateway_error_response(status: Option<StatusCode>) -> CollectorResponse {
    let body = match status {
        Some(status) => serde_json::json!({
            "error": "webhook rejected event",
            "status": status.as_u16(),
        }),
        None => serde_json::json!({ "error": "failed to forward event" }),
    };

    let mut res = Response::new(full_body(body.to_string()));
    *res.status_mut() = StatusCode::BAD_GATEWAY;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    res
}

fn count_response(response: CollectorResponse) -> CollectorResponse {
    shared::counter!(REQUESTS_TOTAL, "status" => status_class(response.status())).increment(1);
    response
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Listener;
    use crate::testutils::start_stub_webhook;
    use http_body_util::Full;
    use serde_json::Value;
    use std::sync::atomic::Ordering;
    use url::Url;

    fn test_service(webhook_port: u16) -> CollectorService {
        let config = Config {
            listener: Listener {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            root_domain: "example.com".to_string(),
            extra_origins: vec!["partner.app".to_string()],
            webhook_url: Some(
                Url::parse(&format!("http://127.0.0.1:{webhook_port}/hook")).unwrap(),
            ),
            cors_max_age_secs: 86_400,
        };
        CollectorService::new(&config).unwrap()
    }

    fn request(
        method: Method,
        path: &str,
        origin: Option<&str>,
        content_type: Option<&str>,
        body: &str,
    ) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(o) = origin {
            builder = builder.header(ORIGIN, o);
        }
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
    }

    async fn body_json(res: CollectorResponse) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (port, _) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(Method::GET, "/healthz", None, None, ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn test_root_status_page() {
        let (port, _) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(Method::GET, "/", None, None, ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (port, _) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(Method::GET, "/nope", None, None, ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_collect_success_returns_204_no_body() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                Some("https://sub.example.com"),
                Some("application/json"),
                r#"{"event_type":"page_view","client_id":"c1"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            res.headers()
                .get(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://sub.example.com"
        );
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_path_alias() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/collect",
                None,
                Some("text/plain"),
                r#"{"event_type":"click"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_body_rejected_before_forwarding() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                None,
                Some("application/json"),
                "{}",
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res).await,
            serde_json::json!({"error": "empty body"})
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_treated_as_empty() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                None,
                Some("text/plain"),
                "definitely not json",
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res).await,
            serde_json::json!({"error": "empty body"})
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_error_reason_echoed() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                None,
                Some("application/json"),
                r#"{"session_id":"not-a-number"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res).await,
            serde_json::json!({"error": "session_id must be number or empty"})
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_denied_origin_blocked_before_handler() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                Some("https://evilexample.com"),
                Some("application/json"),
                r#"{"event_type":"page_view"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(
            res.headers()
                .get(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extra_origin_admitted() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                Some("https://partner.app"),
                Some("application/json"),
                r#"{"event_type":"page_view"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preflight_admitted_and_denied() {
        let (port, _) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::OPTIONS,
                "/collect",
                Some("https://www.example.com"),
                None,
                "",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            res.headers()
                .get(hyper::header::ACCESS_CONTROL_ALLOW_METHODS)
                .unwrap(),
            "POST, GET, OPTIONS"
        );
        assert_eq!(
            res.headers()
                .get(hyper::header::ACCESS_CONTROL_MAX_AGE)
                .unwrap(),
            "86400"
        );

        let res = svc
            .handle(request(
                Method::OPTIONS,
                "/collect",
                Some("https://stranger.net"),
                None,
                "",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let (port, hits) = start_stub_webhook(vec![200]).await;
        let svc = test_service(port);

        let oversized = "x".repeat(MAX_BODY_BYTES + 1);
        let res = svc
            .handle(request(
                Method::POST,
                "/",
                None,
                Some("text/plain"),
                &oversized,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_downstream_4xx_maps_to_gateway_error() {
        let (port, hits) = start_stub_webhook(vec![404]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                None,
                Some("application/json"),
                r#"{"event_type":"page_view"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let parsed = body_json(res).await;
        assert_eq!(parsed["status"], 404);
        assert!(parsed["error"].is_string());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_downstream_failure_maps_to_generic_gateway_error() {
        let (port, hits) = start_stub_webhook(vec![500]).await;
        let svc = test_service(port);

        let res = svc
            .handle(request(
                Method::POST,
                "/",
                None,
                Some("application/json"),
                r#"{"event_type":"page_view"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let parsed = body_json(res).await;
        assert!(parsed.get("status").is_none());
        // One attempt plus the single retry
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
