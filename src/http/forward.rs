//! Forwarding to the remote API server.
//!
//! # Responsibilities
//! - Send the enriched request to the remote server
//! - Turn a `410 Gone` on a watch into a re-list signal
//!
//! # Design Decisions
//! - One pooled hyper client shared by all requests
//! - Headers and body are forwarded as received; the local-only cache
//!   directive has already been stripped by the pipeline
//! - No retries; a failure surfaces as 503 to the caller

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        header::HOST,
        uri::{Authority, InvalidUriParts, Scheme},
        Request, Response, StatusCode, Uri, Version,
    },
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::extract::ListOptions;
use crate::http::context::{
    is_event_create_request, is_kubelet_get_node_request, is_kubelet_lease_request,
    is_list_request_with_name_field_selector, is_subject_access_review_create_get_request,
    RequestContext,
};
use crate::http::relist::relist_watch;
use crate::http::request::{RequestDescriptor, Verb};

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid remote server url {0:?}")]
    InvalidServerUrl(String),

    #[error("failed to build upstream uri: {0}")]
    Uri(#[from] InvalidUriParts),

    #[error("remote server request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Sends a request on towards the remote server (or a local cache).
///
/// The final [`RequestContext`] is available in the request extensions.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError>;
}

/// Forwarder backed by a pooled HTTP client.
#[derive(Clone)]
pub struct RemoteForwarder {
    client: Client<HttpConnector, Body>,
    scheme: Scheme,
    authority: Authority,
}

impl RemoteForwarder {
    pub fn new(config: &RemoteConfig) -> Result<Self, ForwardError> {
        let invalid = || ForwardError::InvalidServerUrl(config.server_url.clone());
        let server: Uri = config.server_url.parse().map_err(|_| invalid())?;
        let scheme = server.scheme().cloned().ok_or_else(invalid)?;
        let authority = server.authority().cloned().ok_or_else(invalid)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        tracing::info!(server = %config.server_url, "Remote forwarder ready");
        Ok(Self { client, scheme, authority })
    }

    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, ForwardError> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some("/".parse().map_err(|_| ForwardError::InvalidServerUrl(uri.to_string()))?);
        }
        Ok(Uri::from_parts(parts)?)
    }
}

#[async_trait]
impl Forwarder for RemoteForwarder {
    async fn forward(&self, mut request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let info = request
            .extensions()
            .get::<RequestDescriptor>()
            .cloned()
            .unwrap_or_else(|| RequestDescriptor::resolve(request.method(), request.uri()));
        let context = request.extensions().get::<RequestContext>().cloned().unwrap_or_default();
        let resource_version = if info.verb == Verb::Watch {
            ListOptions::from_uri(request.uri()).ok().and_then(|opts| opts.resource_version)
        } else {
            None
        };

        if is_routine_kubelet_traffic(&info, &context) {
            tracing::trace!(request = %info, "Forwarding to remote server");
        } else {
            tracing::debug!(
                request = %info,
                client = context.client_component().unwrap_or("unknown"),
                single_object_list = is_list_request_with_name_field_selector(&info, request.uri()),
                "Forwarding to remote server"
            );
        }

        *request.uri_mut() = self.upstream_uri(request.uri())?;
        *request.version_mut() = Version::HTTP_11;
        request.headers_mut().remove(HOST);

        let response = self.client.request(request).await?;

        if response.status() == StatusCode::GONE && info.verb == Verb::Watch {
            return Ok(relist_watch(&info, &context, resource_version.as_deref()));
        }
        Ok(response.map(Body::new))
    }
}

/// Periodic node traffic that would drown other forwarding logs.
fn is_routine_kubelet_traffic(info: &RequestDescriptor, context: &RequestContext) -> bool {
    is_kubelet_lease_request(info, context)
        || is_kubelet_get_node_request(info, context)
        || is_subject_access_review_create_get_request(info, context)
        || is_event_create_request(info)
}
