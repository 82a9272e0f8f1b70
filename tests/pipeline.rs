//! Pipeline behaviour driven through the router without a socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use axum::{
    body::{Body, Bytes},
    http::{header, Request, Response, StatusCode},
};
use tower::ServiceExt;

use edge_proxy::http::forward::{ForwardError, Forwarder};
use edge_proxy::http::middleware::cache_header::EDGE_CACHE_HEADER;
use edge_proxy::http::Pipeline;
use edge_proxy::filter::FilterSet;

mod common;

use common::{build_server_with, proxy_config, tenant, MockForwarder};

fn remote_placeholder() -> std::net::SocketAddr {
    "127.0.0.1:9".parse().unwrap()
}

#[test]
fn stages_run_in_canonical_order() {
    let config = proxy_config(remote_placeholder());
    let forwarder: Arc<dyn Forwarder> = MockForwarder::new(|_| Response::new(Body::empty()));
    let pipeline = Pipeline::from_config(&config, forwarder, FilterSet::empty(), tenant("tenant-a", None));

    assert_eq!(
        pipeline.stage_names(),
        vec![
            "full-trace",
            "pool-scope",
            "partial-metadata",
            "content-type",
            "cache-header",
            "selector",
            "client-component",
            "upstream-trace",
            "admission",
            "timeout",
            "credentials",
        ]
    );
}

#[tokio::test]
async fn forwarded_request_carries_enriched_context() {
    let config = proxy_config(remote_placeholder());
    let forwarder = MockForwarder::new(|_| Response::new(Body::empty()));
    let router = build_server_with(&config, forwarder.clone(), tenant("tenant-a", None)).router();

    let request = Request::get("/api/v1/services?labelSelector=app%3Dweb&fieldSelector=spec.type%3DClusterIP")
        .header(header::USER_AGENT, "Kubelet/1.0 (linux/amd64)")
        .header(header::ACCEPT, "application/json")
        .header(EDGE_CACHE_HEADER, "true")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let seen = forwarder.seen();
    assert_eq!(seen.len(), 1);
    let forwarded = &seen[0];
    assert!(!forwarded.headers.contains_key(EDGE_CACHE_HEADER));
    assert!(forwarded.headers.contains_key("x-request-id"));

    let context = forwarded.context.as_ref().unwrap();
    assert_eq!(context.client_component(), Some("kubelet"));
    assert_eq!(context.selector(), Some("app=web&spec.type=ClusterIP"));
    assert_eq!(context.content_type(), Some("application/json"));
    assert!(context.can_cache());
    assert!(context.is_pool_scope());
}

#[tokio::test]
async fn excess_requests_are_rejected_until_a_slot_frees() {
    let mut config = proxy_config(remote_placeholder());
    config.admission.max_in_flight = 1;

    // A watch that never ends keeps its slot for as long as the body lives.
    let forwarder = MockForwarder::new(|_| {
        Response::new(Body::from_stream(futures_util::stream::pending::<Result<Bytes, std::io::Error>>()))
    });
    let router = build_server_with(&config, forwarder, tenant("tenant-a", None)).router();

    let watch = || Request::get("/api/v1/pods?watch=true").body(Body::empty()).unwrap();

    let first = router.clone().oneshot(watch()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let rejected = router.clone().oneshot(watch()).await.unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.headers()[header::RETRY_AFTER], "1");

    drop(first);
    let admitted = router.clone().oneshot(watch()).await.unwrap();
    assert_eq!(admitted.status(), StatusCode::OK);
}

/// How the first forwarded request goes wrong.
#[derive(Clone, Copy)]
enum FirstFailure {
    Panic,
    Error,
}

/// Fails the first request, then answers every later one with an empty 200.
struct FailsOnce {
    calls: AtomicUsize,
    failure: FirstFailure,
}

impl FailsOnce {
    fn new(failure: FirstFailure) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), failure })
    }
}

#[async_trait]
impl Forwarder for FailsOnce {
    async fn forward(&self, _request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            match self.failure {
                FirstFailure::Panic => panic!("forwarder blew up"),
                FirstFailure::Error => return Err(ForwardError::InvalidServerUrl("nowhere".into())),
            }
        }
        Ok(Response::new(Body::empty()))
    }
}

fn single_slot_router(forwarder: Arc<FailsOnce>) -> axum::Router {
    let mut config = proxy_config(remote_placeholder());
    config.admission.max_in_flight = 1;
    build_server_with(&config, forwarder, tenant("tenant-a", None)).router()
}

#[tokio::test]
async fn slot_is_released_when_forwarder_panics() {
    let router = single_slot_router(FailsOnce::new(FirstFailure::Panic));
    let list = || Request::get("/api/v1/pods").body(Body::empty()).unwrap();

    let crashed = tokio::spawn(router.clone().oneshot(list())).await;
    assert!(crashed.is_err());

    let next = router.oneshot(list()).await.unwrap();
    assert_eq!(next.status(), StatusCode::OK);
}

#[tokio::test]
async fn slot_is_released_when_forwarding_fails() {
    let router = single_slot_router(FailsOnce::new(FirstFailure::Error));
    let list = || Request::get("/api/v1/pods").body(Body::empty()).unwrap();

    let failed = router.clone().oneshot(list()).await.unwrap();
    assert_eq!(failed.status(), StatusCode::SERVICE_UNAVAILABLE);
    drop(failed);

    let next = router.oneshot(list()).await.unwrap();
    assert_eq!(next.status(), StatusCode::OK);
}

#[tokio::test]
async fn pool_scope_requests_use_their_own_pool() {
    let mut config = proxy_config(remote_placeholder());
    config.admission.max_in_flight = 1;

    let forwarder = MockForwarder::new(|_| {
        Response::new(Body::from_stream(futures_util::stream::pending::<Result<Bytes, std::io::Error>>()))
    });
    let router = build_server_with(&config, forwarder, tenant("tenant-a", None)).router();

    let ordinary = router
        .clone()
        .oneshot(Request::get("/api/v1/pods?watch=true").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ordinary.status(), StatusCode::OK);

    let pool_scope = router
        .clone()
        .oneshot(Request::get("/api/v1/services?watch=true").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(pool_scope.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_list_options_never_reach_the_remote() {
    let config = proxy_config(remote_placeholder());
    let forwarder = MockForwarder::new(|_| Response::new(Body::empty()));
    let router = build_server_with(&config, forwarder.clone(), tenant("tenant-a", None)).router();

    let response = router
        .oneshot(Request::get("/api/v1/pods?timeoutSeconds=soon").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(forwarder.seen().is_empty());

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["kind"], "Status");
    assert_eq!(status["reason"], "BadRequest");
}

#[tokio::test]
async fn deadline_turns_slow_remote_into_gateway_timeout() {
    let config = proxy_config(remote_placeholder());
    let forwarder = MockForwarder::slow(Duration::from_secs(5));
    let router = build_server_with(&config, forwarder, tenant("tenant-a", None)).router();

    let started = std::time::Instant::now();
    let response = router
        .oneshot(Request::get("/api/v1/pods?timeoutSeconds=3").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(4));
}
