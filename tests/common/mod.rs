//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, Response, Uri},
    Router,
};
use tokio::net::TcpListener;

use edge_proxy::config::ProxyConfig;
use edge_proxy::filter::{FilterRegistry, FilterSettings};
use edge_proxy::http::forward::{ForwardError, Forwarder};
use edge_proxy::http::{HttpServer, Pipeline, RemoteForwarder, RequestContext};
use edge_proxy::lifecycle::Shutdown;
use edge_proxy::security::TenantCredentialCache;

/// Serve `router` as a mock remote API server on an ephemeral port.
pub async fn start_remote(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Defaults pointed at `remote`, with metrics off.
pub fn proxy_config(remote: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.remote.server_url = format!("http://{remote}");
    config.observability.metrics_enabled = false;
    config.filters.master_service_host = "169.254.2.1".into();
    config.filters.master_service_port = 10268;
    config
}

pub fn tenant(namespace: &str, token: Option<&str>) -> Arc<TenantCredentialCache> {
    let cache = TenantCredentialCache::new(namespace);
    if let Some(token) = token {
        cache.update(token);
    }
    Arc::new(cache)
}

/// Server wired exactly like the binary, forwarding to `config.remote`.
pub fn build_server(config: &ProxyConfig, tenant: Arc<TenantCredentialCache>) -> HttpServer {
    let forwarder = Arc::new(RemoteForwarder::new(&config.remote).unwrap());
    build_server_with(config, forwarder, tenant)
}

pub fn build_server_with(
    config: &ProxyConfig,
    forwarder: Arc<dyn Forwarder>,
    tenant: Arc<TenantCredentialCache>,
) -> HttpServer {
    let filters = FilterRegistry::with_builtins(config.filters.disabled.iter().cloned())
        .build(&FilterSettings::from(&config.filters))
        .unwrap();
    let pipeline = Arc::new(Pipeline::from_config(config, forwarder, filters, tenant));
    HttpServer::new(config.clone(), pipeline)
}

/// Run the proxy on an ephemeral port until the returned handle is triggered.
pub async fn start_proxy(config: ProxyConfig, tenant: Arc<TenantCredentialCache>) -> (SocketAddr, Shutdown) {
    let server = build_server(&config, tenant);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stopped = shutdown.wait();
    tokio::spawn(async move {
        let _ = server.run(listener, stopped).await;
    });
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// What a forwarder was handed.
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub uri: Uri,
    pub headers: HeaderMap,
    pub context: Option<RequestContext>,
}

type Respond = Box<dyn Fn(&Request<Body>) -> Response<Body> + Send + Sync>;

/// Forwarder answering from a closure and recording every request.
pub struct MockForwarder {
    seen: Mutex<Vec<Forwarded>>,
    delay: Option<Duration>,
    respond: Respond,
}

impl MockForwarder {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&Request<Body>) -> Response<Body> + Send + Sync + 'static,
    {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            delay: None,
            respond: Box::new(respond),
        })
    }

    /// Answers with an empty 200 after `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            delay: Some(delay),
            respond: Box::new(|_| Response::new(Body::empty())),
        })
    }

    pub fn seen(&self) -> Vec<Forwarded> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        self.seen.lock().unwrap().push(Forwarded {
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            context: request.extensions().get::<RequestContext>().cloned(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok((self.respond)(&request))
    }
}
