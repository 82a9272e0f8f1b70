//! Responses produced by the proxy itself.
//!
//! # Responsibilities
//! - Render terminal errors as API `Status` documents
//! - Map each error class to its HTTP status code
//!
//! # Design Decisions
//! - Clients are API machinery libraries; they decode the `Status` body, so
//!   plain-text errors would surface as opaque decode failures

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use serde::Serialize;

/// Seconds a rejected client should wait before retrying.
pub const RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, Serialize)]
struct Status<'a> {
    kind: &'static str,
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    metadata: serde_json::Map<String, serde_json::Value>,
    status: &'static str,
    message: &'a str,
    reason: &'static str,
    code: u16,
}

/// Build a failure `Status` response.
pub fn status_response(code: StatusCode, reason: &'static str, message: &str) -> Response {
    let status = Status {
        kind: "Status",
        api_version: "v1",
        metadata: serde_json::Map::new(),
        status: "Failure",
        message,
        reason,
        code: code.as_u16(),
    };
    let body = serde_json::to_vec(&status).unwrap_or_default();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = code;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 429 with a retry hint.
pub fn too_many_requests(message: &str) -> Response {
    let mut response = status_response(StatusCode::TOO_MANY_REQUESTS, "TooManyRequests", message);
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
    response
}

/// 400 for malformed request parameters.
pub fn bad_request(message: &str) -> Response {
    status_response(StatusCode::BAD_REQUEST, "BadRequest", message)
}

/// 503 when the remote server cannot be reached.
pub fn service_unavailable(message: &str) -> Response {
    status_response(StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable", message)
}

/// 504 when the request deadline elapses before the remote answers.
pub fn gateway_timeout(message: &str) -> Response {
    status_response(StatusCode::GATEWAY_TIMEOUT, "Timeout", message)
}
