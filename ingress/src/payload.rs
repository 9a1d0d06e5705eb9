//! Payload coercion, validation, and sanitization.
//!
//! Beacon transports deliver the same JSON document under three content
//! types: `application/json`, `text/plain` (the `sendBeacon` default for
//! string payloads), and `application/octet-stream` (Blob payloads).
//! All three are coerced to one canonical JSON mapping before validation;
//! anything unparseable becomes an empty mapping rather than an error so
//! the handler can answer with a uniform "empty body" rejection.

use hyper::body::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// Transport-level cap on an accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Cap on the serialized size of the nested `event_params` object.
pub const MAX_EVENT_PARAMS_BYTES: usize = 8192;

/// Top-level fields retained by sanitization; everything else is dropped.
pub const ALLOWED_FIELDS: &[&str] = &[
    "client_id",
    "session_id",
    "atraid",
    "atrauid",
    "timestamp",
    "page_url",
    "page_path",
    "page_title",
    "referrer_url",
    "referrer_host",
    "language",
    "screen_resolution",
    "utm_source_first",
    "utm_source_last",
    "utm_medium_first",
    "utm_medium_last",
    "utm_campaign_first",
    "utm_campaign_last",
    "utm_term_first",
    "utm_term_last",
    "utm_content_first",
    "utm_content_last",
    "gclid",
    "gbraid",
    "wbraid",
    "fbclid",
    "msclkid",
    "ttclid",
    "li_fat_id",
    "twclid",
    "ciid",
    "clickid",
    "adset_name",
    "channel_first_touch",
    "channel_last_touch",
    "event_type",
    "event_params",
];

/// Validation failures surfaced to the caller as 400 reasons
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid body")]
    InvalidBody,

    #[error("session_id must be number or empty")]
    InvalidSessionId,

    #[error("event_params must be object")]
    EventParamsNotObject,

    #[error("event_params too large")]
    EventParamsTooLarge,
}

enum BodyKind {
    Json,
    Text,
    Raw,
}

impl BodyKind {
    fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(raw) = content_type else {
            return BodyKind::Raw;
        };
        // Ignore parameters like "; charset=utf-8"
        let mime = raw.split(';').next().unwrap_or(raw).trim();

        if mime.eq_ignore_ascii_case("application/json") {
            BodyKind::Json
        } else if mime.eq_ignore_ascii_case("text/plain") {
            BodyKind::Text
        } else {
            BodyKind::Raw
        }
    }
}

/// Normalizes a request body to a single JSON value.
///
/// Text and raw bodies go through a UTF-8 decode before the JSON parse;
/// every failure path yields `{}` so malformed input surfaces as an
/// empty-body rejection downstream instead of a parse error.
pub fn coerce_body(bytes: &Bytes, content_type: Option<&str>) -> Value {
    let parsed = match BodyKind::from_content_type(content_type) {
        BodyKind::Json => serde_json::from_slice(bytes).ok(),
        BodyKind::Text | BodyKind::Raw => std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| serde_json::from_str(text).ok()),
    };

    parsed.unwrap_or_else(|| Value::Object(Map::new()))
}

/// Validates a coerced payload and returns a sanitized copy holding only
/// allow-listed fields.
///
/// Checks run in order with the first failure winning; emptiness is the
/// handler's concern, not a validation failure. Unknown keys are dropped
/// silently rather than rejected.
pub fn validate_and_sanitize(value: &Value) -> Result<Map<String, Value>, ValidationError> {
    let map = value.as_object().ok_or(ValidationError::InvalidBody)?;

    if let Some(session_id) = map.get("session_id") {
        let acceptable = session_id.as_str() == Some("") || session_id.is_number();
        if !acceptable {
            return Err(ValidationError::InvalidSessionId);
        }
    }

    if let Some(params) = map.get("event_params") {
        if !params.is_null() && !params.is_object() {
            return Err(ValidationError::EventParamsNotObject);
        }
        let too_large = serde_json::to_string(params)
            .is_ok_and(|serialized| serialized.len() > MAX_EVENT_PARAMS_BYTES);
        if too_large {
            return Err(ValidationError::EventParamsTooLarge);
        }
    }

    let sanitized = map
        .iter()
        .filter(|(key, _)| ALLOWED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(sanitized)
}
