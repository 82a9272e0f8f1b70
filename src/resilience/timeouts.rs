//! Timeout adjustment for get/list/watch.
//!
//! # Responsibilities
//! - Derive a request deadline from the client's own timeout
//! - Reject list/watch requests whose options do not decode
//!
//! # Design Decisions
//! - Watches get a margin on top so the proxy outlives the client's session
//!   and sees a server-side close before its own deadline
//! - Lists and gets lose a margin so a local answer is still possible before
//!   the client gives up
//! - Zero or negative results install no deadline
//! - Requests without a deadline of their own fall back to the configured
//!   request timeout, except long-running watch and proxy requests

use std::time::Duration;

use axum::http::Uri;

use crate::extract::{DecodeError, ListOptions};
use crate::http::middleware::{Deadline, Exchange, Flow, Stage};
use crate::http::request::{RequestDescriptor, Verb};
use crate::http::response::bad_request;

/// Added to a watch's requested timeout.
pub const WATCH_TIMEOUT_MARGIN_SECS: i64 = 15;

/// Taken off a list's or get's requested timeout.
pub const GET_LIST_TIMEOUT_REDUCTION_SECS: i64 = 2;

/// Deadline for a request, or `None` when none applies.
pub fn adjusted_timeout(info: &RequestDescriptor, uri: &Uri) -> Result<Option<Duration>, DecodeError> {
    if !info.is_resource_request {
        return Ok(None);
    }

    let seconds = match info.verb {
        Verb::List | Verb::Watch => {
            let opts = ListOptions::from_uri(uri)?;

            match opts.timeout_seconds {
                Some(t) if info.verb == Verb::Watch => t.checked_add(WATCH_TIMEOUT_MARGIN_SECS),
                Some(t) => t.checked_sub(GET_LIST_TIMEOUT_REDUCTION_SECS),
                None => return Ok(None),
            }
        }
        Verb::Get => return Ok(get_timeout(uri.query())),
        _ => return Ok(None),
    };

    // Overflow on either side means no usable deadline.
    Ok(seconds
        .and_then(|s| u64::try_from(s).ok())
        .filter(|s| *s > 0)
        .map(Duration::from_secs))
}

/// A plain get carries its timeout as a duration string (`timeout=30s`).
fn get_timeout(query: Option<&str>) -> Option<Duration> {
    let raw = url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == "timeout")
        .map(|(_, v)| v.into_owned())?;

    let requested = humantime::parse_duration(raw.trim()).ok()?;
    let reduction = Duration::from_secs(GET_LIST_TIMEOUT_REDUCTION_SECS as u64);
    requested.checked_sub(reduction).filter(|t| !t.is_zero())
}

/// Installs the adjusted deadline on the exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutAdjuster {
    fallback: Option<Duration>,
}

impl TimeoutAdjuster {
    /// `request_secs` of zero means no fallback deadline.
    pub fn new(request_secs: u64) -> Self {
        Self {
            fallback: (request_secs > 0).then(|| Duration::from_secs(request_secs)),
        }
    }

    fn fallback_for(&self, info: &RequestDescriptor) -> Option<Duration> {
        match info.verb {
            Verb::Watch | Verb::Proxy => None,
            _ => self.fallback,
        }
    }
}

impl Stage for TimeoutAdjuster {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        match adjusted_timeout(&exchange.info, &exchange.parts.uri) {
            Ok(Some(timeout)) => {
                exchange.deadline = Deadline::after(timeout);
                if exchange.deadline.is_some() {
                    tracing::debug!(request = %exchange.info, ?timeout, "Installing request deadline");
                } else {
                    tracing::debug!(request = %exchange.info, ?timeout, "Requested timeout out of range, no deadline");
                }
                Flow::Continue(exchange)
            }
            Ok(None) => {
                exchange.deadline = self.fallback_for(&exchange.info).and_then(Deadline::after);
                Flow::Continue(exchange)
            }
            Err(e) => {
                tracing::error!(request = %exchange.info, error = %e, "Could not decode parameters for list/watch request");
                let response = bad_request(&e.to_string());
                Flow::Respond(exchange, response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Method, http::Request, http::StatusCode};

    fn timeout_for(method: Method, uri: &str) -> Option<Duration> {
        let uri: Uri = uri.parse().unwrap();
        let info = RequestDescriptor::resolve(&method, &uri);
        adjusted_timeout(&info, &uri).unwrap()
    }

    #[test]
    fn watch_gets_margin() {
        assert_eq!(
            timeout_for(Method::GET, "/api/v1/pods?watch=true&timeoutSeconds=300"),
            Some(Duration::from_secs(315))
        );
        assert_eq!(
            timeout_for(Method::GET, "/api/v1/watch/pods?timeoutSeconds=0"),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn list_loses_margin_above_two_seconds() {
        assert_eq!(timeout_for(Method::GET, "/api/v1/pods?timeoutSeconds=30"), Some(Duration::from_secs(28)));
        assert_eq!(timeout_for(Method::GET, "/api/v1/pods?timeoutSeconds=3"), Some(Duration::from_secs(1)));
        assert_eq!(timeout_for(Method::GET, "/api/v1/pods?timeoutSeconds=2"), None);
        assert_eq!(timeout_for(Method::GET, "/api/v1/pods?timeoutSeconds=1"), None);
        assert_eq!(timeout_for(Method::GET, "/api/v1/pods"), None);
    }

    #[test]
    fn get_uses_duration_parameter() {
        assert_eq!(
            timeout_for(Method::GET, "/api/v1/namespaces/default/pods/web-0?timeout=10s"),
            Some(Duration::from_secs(8))
        );
        assert_eq!(timeout_for(Method::GET, "/api/v1/namespaces/default/pods/web-0?timeout=2s"), None);
        assert_eq!(timeout_for(Method::GET, "/api/v1/namespaces/default/pods/web-0?timeout=soon"), None);
    }

    #[test]
    fn other_verbs_and_paths_are_untouched() {
        assert_eq!(timeout_for(Method::POST, "/api/v1/namespaces/default/pods?timeoutSeconds=30"), None);
        assert_eq!(timeout_for(Method::GET, "/healthz?timeout=30s"), None);
    }

    #[test]
    fn numeric_label_comparisons_pass_through() {
        assert_eq!(timeout_for(Method::GET, "/api/v1/pods?labelSelector=replicas%3E1"), None);
        assert_eq!(
            timeout_for(Method::GET, "/api/v1/pods?labelSelector=replicas%3C5&timeoutSeconds=30"),
            Some(Duration::from_secs(28))
        );
    }

    #[test]
    fn malformed_list_options_are_rejected() {
        let request = Request::get("/api/v1/pods?timeoutSeconds=abc").body(Body::empty()).unwrap();
        match TimeoutAdjuster::default().handle(Exchange::new(request)) {
            Flow::Respond(_, response) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
            Flow::Continue(_) => panic!("malformed timeoutSeconds must be rejected"),
        }
    }

    #[tokio::test]
    async fn fallback_skips_long_running_requests() {
        let adjuster = TimeoutAdjuster::new(30);

        let create = Request::post("/api/v1/namespaces/default/pods").body(Body::empty()).unwrap();
        match adjuster.handle(Exchange::new(create)) {
            Flow::Continue(exchange) => assert_eq!(exchange.deadline.unwrap().timeout, Duration::from_secs(30)),
            Flow::Respond(..) => panic!("create must continue"),
        }

        let watch = Request::get("/api/v1/pods?watch=true").body(Body::empty()).unwrap();
        match adjuster.handle(Exchange::new(watch)) {
            Flow::Continue(exchange) => assert!(exchange.deadline.is_none()),
            Flow::Respond(..) => panic!("watch must continue"),
        }

        let list = Request::get("/api/v1/pods?timeoutSeconds=10").body(Body::empty()).unwrap();
        match adjuster.handle(Exchange::new(list)) {
            Flow::Continue(exchange) => assert_eq!(exchange.deadline.unwrap().timeout, Duration::from_secs(8)),
            Flow::Respond(..) => panic!("list must continue"),
        }
    }

    #[test]
    fn extreme_timeout_seconds_install_no_deadline() {
        let max = format!("/api/v1/pods?timeoutSeconds={}", i64::MAX);
        let min = format!("/api/v1/pods?timeoutSeconds={}", i64::MIN);
        let watch_max = format!("/api/v1/pods?watch=true&timeoutSeconds={}", i64::MAX);
        let watch_min = format!("/api/v1/pods?watch=true&timeoutSeconds={}", i64::MIN);

        assert_eq!(timeout_for(Method::GET, &watch_max), None);
        assert_eq!(timeout_for(Method::GET, &watch_min), None);
        assert_eq!(timeout_for(Method::GET, &min), None);
        assert_eq!(
            timeout_for(Method::GET, &max),
            Some(Duration::from_secs((i64::MAX - GET_LIST_TIMEOUT_REDUCTION_SECS) as u64))
        );
    }

    #[tokio::test]
    async fn unrepresentable_deadlines_continue_without_one() {
        let uris = [
            format!("/api/v1/pods?timeoutSeconds={}", i64::MAX),
            format!("/api/v1/pods?watch=true&timeoutSeconds={}", i64::MAX - 100),
            format!("/api/v1/pods?timeoutSeconds={}", i64::MIN),
            "/api/v1/namespaces/default/pods/web-0?timeout=500000000000y".to_string(),
        ];
        for uri in uris {
            let request = Request::get(uri.as_str()).body(Body::empty()).unwrap();
            match TimeoutAdjuster::default().handle(Exchange::new(request)) {
                Flow::Continue(exchange) => assert!(exchange.deadline.is_none(), "{uri}"),
                Flow::Respond(..) => panic!("{uri} must continue"),
            }
        }
    }

    #[tokio::test]
    async fn oversized_fallback_is_ignored() {
        let adjuster = TimeoutAdjuster::new(u64::MAX);
        let create = Request::post("/api/v1/namespaces/default/pods").body(Body::empty()).unwrap();
        match adjuster.handle(Exchange::new(create)) {
            Flow::Continue(exchange) => assert!(exchange.deadline.is_none()),
            Flow::Respond(..) => panic!("create must continue"),
        }
    }

    #[tokio::test]
    async fn deadline_is_installed() {
        let request = Request::get("/api/v1/pods?watch=1&timeoutSeconds=60").body(Body::empty()).unwrap();
        match TimeoutAdjuster::default().handle(Exchange::new(request)) {
            Flow::Continue(exchange) => {
                let deadline = exchange.deadline.unwrap();
                assert_eq!(deadline.timeout, Duration::from_secs(75));
            }
            Flow::Respond(..) => panic!("valid watch must continue"),
        }
    }
}
