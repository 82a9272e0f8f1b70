//! Request-interception pipeline.
//!
//! # Data Flow
//! ```text
//! Request (descriptor attached)
//!     → Exchange { head, body, descriptor, context }
//!     → stage 1 .. stage N   (each: Continue(exchange) | Respond(exchange, response))
//!     → Forwarder            (enriched context in request extensions)
//!     → object filters       (response path)
//!     → Response             (admission token and traces live as long as the body)
//! ```
//!
//! # Design Decisions
//! - Stages run in a fixed order from a flat list; no nested wrapping
//! - A stage only reads facts set by earlier stages
//! - Per-request resources (admission token, in-flight traces, deadline) are
//!   owned by the exchange and then by the response body, so every exit path
//!   releases them exactly once

pub mod cache_header;
pub mod client_component;
pub mod content_type;
pub mod partial_metadata;
pub mod pool_scope;
pub mod selector;
pub mod trace;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{request::Parts, HeaderName, Request, StatusCode},
    response::Response,
};
use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::ProxyConfig;
use crate::filter::response::filter_response;
use crate::filter::FilterSet;
use crate::http::context::RequestContext;
use crate::http::forward::{ForwardError, Forwarder};
use crate::http::request::RequestDescriptor;
use crate::http::response::{gateway_timeout, service_unavailable};
use crate::resilience::timeouts::TimeoutAdjuster;
use crate::security::admission::{AdmissionController, AdmissionToken};
use crate::security::credentials::{CredentialRewriter, TenantCredentials};

use self::trace::RequestTrace;

/// Deadline installed for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub timeout: Duration,
    pub at: Instant,
}

impl Deadline {
    /// `None` when `timeout` reaches past what the clock can represent.
    pub fn after(timeout: Duration) -> Option<Self> {
        let at = Instant::now().checked_add(timeout)?;
        Some(Self { timeout, at })
    }
}

/// Resources that must outlive the request handling and be released once.
#[derive(Default)]
pub struct Held {
    pub admission: Option<AdmissionToken>,
    pub traces: Vec<RequestTrace>,
    cancel: Option<DropGuard>,
}

impl Held {
    /// Stamp the final status and context on every trace.
    fn complete(&mut self, status: StatusCode, context: &RequestContext) {
        for trace in &mut self.traces {
            trace.complete(status, context);
        }
    }
}

/// A request moving through the pipeline.
pub struct Exchange {
    pub parts: Parts,
    pub body: Body,
    pub info: RequestDescriptor,
    pub context: RequestContext,
    pub deadline: Option<Deadline>,
    pub held: Held,
}

impl Exchange {
    pub fn new(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let info = parts
            .extensions
            .get::<RequestDescriptor>()
            .cloned()
            .unwrap_or_else(|| RequestDescriptor::resolve(&parts.method, &parts.uri));

        Self {
            parts,
            body,
            info,
            context: RequestContext::new(),
            deadline: None,
            held: Held::default(),
        }
    }

    /// Header value as text, if present and valid.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.parts
            .headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    pub fn remove_header(&mut self, name: &HeaderName) {
        self.parts.headers.remove(name);
    }

    /// Finish with a response produced inside the pipeline.
    fn finish(mut self, response: Response) -> Response {
        self.held.complete(response.status(), &self.context);
        response
    }
}

/// Outcome of a stage.
pub enum Flow {
    /// Hand the exchange to the next stage.
    Continue(Exchange),
    /// Stop here and answer with this response.
    Respond(Exchange, Response),
}

/// One step of the pipeline.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, exchange: Exchange) -> Flow;
}

/// Ordered stages plus the forwarding collaborator.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    forwarder: Arc<dyn Forwarder>,
    filters: Arc<FilterSet>,
}

impl Pipeline {
    /// An empty pipeline that only forwards.
    pub fn new(forwarder: Arc<dyn Forwarder>, filters: Arc<FilterSet>) -> Self {
        Self {
            stages: Vec::new(),
            forwarder,
            filters,
        }
    }

    /// Append a stage.
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The canonical stage order.
    pub fn from_config(
        config: &ProxyConfig,
        forwarder: Arc<dyn Forwarder>,
        filters: Arc<FilterSet>,
        tenant: Arc<dyn TenantCredentials>,
    ) -> Self {
        Self::new(forwarder, filters)
            .stage(trace::FullTrace)
            .stage(pool_scope::PoolScopeClassifier::new(&config.pool_scope))
            .stage(partial_metadata::PartialMetadataNegotiation)
            .stage(content_type::ContentTypeCapture)
            .stage(cache_header::CacheHeaderCapture)
            .stage(selector::SelectorExtraction)
            .stage(client_component::ClientComponentExtraction::new(config.working_mode))
            .stage(trace::UpstreamTrace)
            .stage(AdmissionController::new(config.admission.max_in_flight))
            .stage(TimeoutAdjuster::new(config.timeouts.request_secs))
            .stage(CredentialRewriter::new(tenant))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run a request through every stage and forward it.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let mut exchange = Exchange::new(request);

        for stage in &self.stages {
            match stage.handle(exchange) {
                Flow::Continue(next) => exchange = next,
                Flow::Respond(exchange, response) => {
                    tracing::debug!(stage = stage.name(), status = %response.status(), "Request answered by pipeline stage");
                    return exchange.finish(response);
                }
            }
        }

        self.dispatch(exchange).await
    }

    async fn dispatch(&self, exchange: Exchange) -> Response {
        let Exchange { parts, body, info, context, deadline, mut held } = exchange;

        let cancel = CancellationToken::new();
        held.cancel = Some(cancel.clone().drop_guard());

        let mut request = Request::from_parts(parts, body);
        request.extensions_mut().insert(context.clone());

        let chain = self.filters.chain_for(&info.resource, info.verb);
        let work = async {
            let response = self.forwarder.forward(request).await?;
            Ok::<_, ForwardError>(filter_response(response, &info, chain, cancel.clone()).await)
        };

        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline.at, work).await {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    tracing::warn!(request = %info, timeout = ?deadline.timeout, "Request deadline exceeded before response");
                    let response = gateway_timeout("the request deadline was exceeded");
                    held.complete(response.status(), &context);
                    return response;
                }
            },
            None => work.await,
        };

        let response = result.unwrap_or_else(|e| {
            tracing::error!(request = %info, error = %e, "Forwarding failed");
            service_unavailable(&e.to_string())
        });

        held.complete(response.status(), &context);
        bind_to_body(response, held, deadline, cancel)
    }
}

/// Keep per-request resources alive until the body is done, and cut the body
/// off when the deadline elapses.
fn bind_to_body(
    response: Response,
    held: Held,
    deadline: Option<Deadline>,
    cancel: CancellationToken,
) -> Response {
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().map(move |chunk| {
        let _held = &held;
        chunk
    });

    let body = match deadline {
        Some(deadline) => Body::from_stream(stream.take_until(async move {
            tokio::time::sleep_until(deadline.at).await;
            cancel.cancel();
        })),
        None => Body::from_stream(stream),
    };
    Response::from_parts(parts, body)
}
