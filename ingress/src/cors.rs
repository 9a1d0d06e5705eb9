use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, HeaderMap, HeaderValue, VARY,
};
use hyper::{Response, StatusCode};
use shared::http::empty_body;

/// Methods a browser may use against the collection endpoints.
pub const ALLOWED_METHODS: &str = "POST, GET, OPTIONS";

/// Request headers a browser may send; beacons only need these two.
pub const ALLOWED_HEADERS: &str = "Content-Type, Accept";

/// Response to an admitted preflight: permissive enough for beacon
/// transports, bounded to the methods and headers above, and cacheable
/// for `max_age_secs`.
pub fn preflight_response<E>(origin: &HeaderValue, max_age_secs: u64) -> Response<BoxBody<Bytes, E>> {
    let mut res = Response::new(empty_body());
    *res.status_mut() = StatusCode::NO_CONTENT;

    let headers = res.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    if let Ok(value) = HeaderValue::from_str(&max_age_secs.to_string()) {
        headers.insert(ACCESS_CONTROL_MAX_AGE, value);
    }
    headers.insert(VARY, HeaderValue::from_static("Origin"));

    res
}

/// Marks an actual (non-preflight) response as readable by the admitted
/// origin. The echoed origin varies per request, so caches must key on it.
pub fn apply_cors_headers(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.append(VARY, HeaderValue::from_static("Origin"));
}

/// Cross-origin denial: a bare 403 with no CORS headers, so the browser
/// blocks the response without any internals leaking to the page.
pub fn denied_response<E>() -> Response<BoxBody<Bytes, E>> {
    let mut res = Response::new(empty_body());
    *res.status_mut() = StatusCode::FORBIDDEN;
    res
}
