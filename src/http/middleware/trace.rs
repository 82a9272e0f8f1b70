//! Request tracing stages.
//!
//! Two independent wrappers:
//! - `FullTrace` runs first and spans the whole proxy traversal
//! - `UpstreamTrace` runs once the client component is known and spans the
//!   rest of the pipeline plus the forwarding call; it also owns the
//!   in-flight gauge
//!
//! Each wrapper leaves a [`RequestTrace`] in the exchange. The trace is
//! stamped with the final status and context when the response is produced
//! and reports when it is dropped, i.e. after the response body is done.

use std::sync::Once;

use axum::http::{request::Parts, StatusCode};
use tokio::time::Instant;

use super::{Exchange, Flow, Stage};
use crate::http::context::{is_kubelet_lease_request, RequestContext};
use crate::http::request::{RequestDescriptor, Verb};
use crate::observability::metrics::{self, RequestLabels};

/// Which wrapper produced a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Upstream,
    Full,
}

impl TraceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceKind::Upstream => "upstream",
            TraceKind::Full => "full",
        }
    }
}

/// Latency and in-flight accounting for one request.
#[derive(Debug)]
pub struct RequestTrace {
    kind: TraceKind,
    started: Instant,
    labels: RequestLabels,
    verb: Verb,
    path: String,
    lease: bool,
    in_flight: Option<bool>,
    status: Option<StatusCode>,
}

impl RequestTrace {
    fn start(kind: TraceKind, info: &RequestDescriptor, context: &RequestContext) -> Self {
        Self {
            kind,
            started: Instant::now(),
            labels: labels_for(info, context),
            verb: info.verb,
            path: info.path.clone(),
            lease: is_kubelet_lease_request(info, context),
            in_flight: None,
            status: None,
        }
    }

    /// Count the request as in flight until the trace is dropped.
    fn track_in_flight(mut self, pool_scope: bool) -> Self {
        metrics::inc_in_flight(pool_scope, &self.labels);
        self.in_flight = Some(pool_scope);
        self
    }

    /// Record the status written to the client along with the final context.
    pub fn complete(&mut self, status: StatusCode, context: &RequestContext) {
        self.status = Some(status);
        if self.in_flight.is_none() {
            self.labels.client = context.client_component().unwrap_or_default().to_string();
        }
    }

    pub fn kind(&self) -> TraceKind {
        self.kind
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Watch and proxy sessions last as long as the client keeps them open.
    fn records_latency(&self) -> bool {
        !matches!(self.verb, Verb::Watch | Verb::Proxy)
    }
}

impl Drop for RequestTrace {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();

        if let Some(pool_scope) = self.in_flight {
            metrics::dec_in_flight(pool_scope, &self.labels);
        }
        if self.records_latency() {
            metrics::record_latency(&self.labels, self.kind.as_str(), elapsed);
        }

        if self.kind == TraceKind::Upstream {
            let status = self.status.map(|s| s.as_u16()).unwrap_or_default();
            if self.lease {
                tracing::trace!(client = %self.labels.client, verb = self.labels.verb, path = %self.path, status, ?elapsed, "Request finished");
            } else {
                tracing::debug!(client = %self.labels.client, verb = self.labels.verb, path = %self.path, status, ?elapsed, "Request finished");
            }
        }
    }
}

fn labels_for(info: &RequestDescriptor, context: &RequestContext) -> RequestLabels {
    RequestLabels {
        verb: info.verb.as_str(),
        resource: info.resource.clone(),
        subresource: info.subresource.clone(),
        client: context.client_component().unwrap_or_default().to_string(),
    }
}

/// What the response side of the connection can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterCapabilities {
    /// Streaming bodies are always flushed frame by frame.
    pub flush: bool,
    /// The connection can be taken over for upgraded protocols.
    pub upgrade: bool,
}

impl WriterCapabilities {
    pub fn probe(parts: &Parts) -> Self {
        Self {
            flush: true,
            upgrade: parts.extensions.get::<hyper::upgrade::OnUpgrade>().is_some(),
        }
    }
}

static MISSING_UPGRADE: Once = Once::new();

/// Outer wrapper spanning the entire proxy traversal.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullTrace;

impl Stage for FullTrace {
    fn name(&self) -> &'static str {
        "full-trace"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        let trace = RequestTrace::start(TraceKind::Full, &exchange.info, &exchange.context);
        exchange.held.traces.push(trace);
        Flow::Continue(exchange)
    }
}

/// Wrapper around admission, forwarding and filtering.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpstreamTrace;

impl Stage for UpstreamTrace {
    fn name(&self) -> &'static str {
        "upstream-trace"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        let capabilities = WriterCapabilities::probe(&exchange.parts);
        if !capabilities.upgrade {
            MISSING_UPGRADE.call_once(|| {
                tracing::info!("Response writer does not support connection upgrade; continuing without it");
            });
        }

        let trace = RequestTrace::start(TraceKind::Upstream, &exchange.info, &exchange.context)
            .track_in_flight(exchange.context.is_pool_scope());
        exchange.held.traces.push(trace);
        Flow::Continue(exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn exchange(uri: &str) -> Exchange {
        Exchange::new(Request::get(uri).body(Body::empty()).unwrap())
    }

    #[test]
    fn full_trace_takes_client_from_final_context() {
        let Flow::Continue(mut exchange) = FullTrace.handle(exchange("/api/v1/pods")) else {
            panic!("trace stage must not answer");
        };
        exchange.context.set_client_component("kubelet");

        let mut held = std::mem::take(&mut exchange.held);
        held.complete(StatusCode::OK, &exchange.context);

        let trace = &held.traces[0];
        assert_eq!(trace.kind(), TraceKind::Full);
        assert_eq!(trace.status(), Some(StatusCode::OK));
        assert_eq!(trace.labels.client, "kubelet");
        assert_eq!(trace.labels.verb, "list");
    }

    #[test]
    fn watch_and_proxy_skip_latency() {
        let Flow::Continue(exchange) = UpstreamTrace.handle(exchange("/api/v1/pods?watch=true")) else {
            panic!("trace stage must not answer");
        };
        assert!(!exchange.held.traces[0].records_latency());

        let Flow::Continue(exchange) = UpstreamTrace.handle(self::exchange("/api/v1/pods")) else {
            panic!("trace stage must not answer");
        };
        assert!(exchange.held.traces[0].records_latency());
    }

    #[test]
    fn probe_without_connection_reports_no_upgrade() {
        let (parts, _) = Request::get("/").body(()).unwrap().into_parts();
        let capabilities = WriterCapabilities::probe(&parts);
        assert!(capabilities.flush);
        assert!(!capabilities.upgrade);
    }
}
