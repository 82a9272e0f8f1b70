//! Request classification.
//!
//! # Responsibilities
//! - Derive a `RequestDescriptor` from method, path and query
//! - Attach it to the request extensions before the pipeline runs
//!
//! # Design Decisions
//! - The descriptor is immutable once attached; stages only read it
//! - Anything that does not follow the `/api` or `/apis` grammar is a
//!   non-resource request and skips resource-specific stages

use std::fmt;
use std::task::{Context, Poll};

use axum::http::{Method, Request, Uri};
use tower::{Layer, Service};

use crate::config::GroupVersionResource;
use crate::extract::list_options::{parse_bool, ListOptions};

/// Request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Verb {
    #[default]
    Get,
    List,
    Watch,
    Create,
    Update,
    Patch,
    Delete,
    DeleteCollection,
    Proxy,
    Unknown,
}

impl Verb {
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD => Verb::Get,
            Method::POST => Verb::Create,
            Method::PUT => Verb::Update,
            Method::PATCH => Verb::Patch,
            Method::DELETE => Verb::Delete,
            _ => Verb::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Watch => "watch",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
            Verb::DeleteCollection => "deletecollection",
            Verb::Proxy => "proxy",
            Verb::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (group, version, kind) resource type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

/// What an inbound request addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestDescriptor {
    /// True when the path addresses a resource under `/api` or `/apis`.
    pub is_resource_request: bool,
    pub path: String,
    pub verb: Verb,
    pub api_group: String,
    pub api_version: String,
    pub namespace: String,
    pub resource: String,
    pub subresource: String,
    pub name: String,
}

/// Namespace subresources that must not be read as a namespaced resource.
const NAMESPACE_SUBRESOURCES: [&str; 2] = ["status", "finalize"];

impl RequestDescriptor {
    /// Classify a request from its method and URI.
    pub fn resolve(method: &Method, uri: &Uri) -> Self {
        let path = uri.path();
        let mut info = Self {
            path: path.to_string(),
            verb: Verb::from_method(method),
            ..Default::default()
        };

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.len() < 3 {
            return info;
        }

        let mut parts = match segments[0] {
            "api" => &segments[1..],
            "apis" => {
                if segments.len() < 4 {
                    return info;
                }
                info.api_group = segments[1].to_string();
                &segments[2..]
            }
            _ => return info,
        };

        info.api_version = parts[0].to_string();
        parts = &parts[1..];
        info.is_resource_request = true;

        match parts[0] {
            "watch" | "proxy" => {
                if parts.len() < 2 {
                    info.is_resource_request = false;
                    return info;
                }
                info.verb = if parts[0] == "watch" {
                    Verb::Watch
                } else {
                    Verb::Proxy
                };
                parts = &parts[1..];
            }
            _ => {}
        }

        if parts[0] == "namespaces" && parts.len() > 1 {
            info.namespace = parts[1].to_string();
            if parts.len() > 2 && !NAMESPACE_SUBRESOURCES.contains(&parts[2]) {
                parts = &parts[2..];
            }
        }

        if parts.len() >= 3 && info.verb != Verb::Proxy {
            info.subresource = parts[2].to_string();
        }
        if parts.len() >= 2 {
            info.name = parts[1].to_string();
        }
        info.resource = parts[0].to_string();

        if info.name.is_empty() && info.verb == Verb::Get {
            info.resolve_collection_get(uri);
        }
        if info.name.is_empty() && info.verb == Verb::Delete {
            info.verb = Verb::DeleteCollection;
        }

        info
    }

    /// A nameless get is a list or a watch, possibly pinned to one name.
    fn resolve_collection_get(&mut self, uri: &Uri) {
        let opts = match ListOptions::from_uri(uri) {
            Ok(opts) => opts,
            Err(_) => ListOptions {
                watch: uri
                    .query()
                    .and_then(|q| {
                        url::form_urlencoded::parse(q.as_bytes())
                            .find(|(k, _)| k == "watch")
                            .map(|(_, v)| parse_bool(&v))
                    })
                    .unwrap_or(false),
                ..Default::default()
            },
        };

        self.verb = if opts.watch { Verb::Watch } else { Verb::List };

        if let Some(name) = opts
            .field_selector
            .as_ref()
            .and_then(|fs| fs.requires_exact_match("metadata.name"))
        {
            if is_valid_path_segment(name) {
                self.name = name.to_string();
            }
        }
    }

    /// Group/version/resource addressed by this request.
    pub fn group_version_resource(&self) -> GroupVersionResource {
        GroupVersionResource::new(&self.api_group, &self.api_version, &self.resource)
    }

    /// True for list and watch requests.
    pub fn is_list_or_watch(&self) -> bool {
        matches!(self.verb, Verb::List | Verb::Watch)
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_resource_request {
            write!(f, "{} {}", self.verb, self.resource)?;
            if !self.subresource.is_empty() {
                write!(f, "/{}", self.subresource)?;
            }
            write!(f, ": {}", self.path)
        } else {
            write!(f, "{} {}", self.verb, self.path)
        }
    }
}

fn is_valid_path_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '%'])
}

/// Layer attaching a [`RequestDescriptor`] to every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestInfoLayer;

impl<S> Layer<S> for RequestInfoLayer {
    type Service = RequestInfoService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestInfoService { inner }
    }
}

/// Service produced by [`RequestInfoLayer`].
#[derive(Debug, Clone)]
pub struct RequestInfoService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for RequestInfoService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let info = RequestDescriptor::resolve(req.method(), req.uri());
        req.extensions_mut().insert(info);
        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(method: Method, uri: &str) -> RequestDescriptor {
        RequestDescriptor::resolve(&method, &uri.parse().unwrap())
    }

    #[test]
    fn namespaced_get() {
        let info = resolve(Method::GET, "/api/v1/namespaces/default/pods/web-0");
        assert!(info.is_resource_request);
        assert_eq!(info.verb, Verb::Get);
        assert_eq!(info.api_group, "");
        assert_eq!(info.api_version, "v1");
        assert_eq!(info.namespace, "default");
        assert_eq!(info.resource, "pods");
        assert_eq!(info.name, "web-0");
    }

    #[test]
    fn group_list_and_watch() {
        let list = resolve(Method::GET, "/apis/discovery.k8s.io/v1/endpointslices");
        assert_eq!(list.verb, Verb::List);
        assert_eq!(list.api_group, "discovery.k8s.io");
        assert_eq!(list.resource, "endpointslices");

        let watch = resolve(Method::GET, "/api/v1/services?watch=true&resourceVersion=10");
        assert_eq!(watch.verb, Verb::Watch);

        let legacy_watch = resolve(Method::GET, "/api/v1/watch/namespaces/kube-system/pods");
        assert_eq!(legacy_watch.verb, Verb::Watch);
        assert_eq!(legacy_watch.namespace, "kube-system");
        assert_eq!(legacy_watch.resource, "pods");
    }

    #[test]
    fn subresource_and_write_verbs() {
        let status = resolve(Method::PATCH, "/api/v1/nodes/node-1/status");
        assert_eq!(status.verb, Verb::Patch);
        assert_eq!(status.resource, "nodes");
        assert_eq!(status.subresource, "status");

        let create = resolve(Method::POST, "/apis/coordination.k8s.io/v1/namespaces/kube-node-lease/leases");
        assert_eq!(create.verb, Verb::Create);
        assert_eq!(create.resource, "leases");

        let delete_all = resolve(Method::DELETE, "/api/v1/namespaces/default/pods");
        assert_eq!(delete_all.verb, Verb::DeleteCollection);
    }

    #[test]
    fn namespace_itself_and_its_subresources() {
        let ns = resolve(Method::GET, "/api/v1/namespaces/default");
        assert_eq!(ns.resource, "namespaces");
        assert_eq!(ns.name, "default");

        let finalize = resolve(Method::PUT, "/api/v1/namespaces/default/finalize");
        assert_eq!(finalize.resource, "namespaces");
        assert_eq!(finalize.name, "default");
        assert_eq!(finalize.subresource, "finalize");
    }

    #[test]
    fn name_field_selector_pins_list() {
        let info = resolve(Method::GET, "/api/v1/nodes?fieldSelector=metadata.name%3Dnode-1");
        assert_eq!(info.verb, Verb::List);
        assert_eq!(info.name, "node-1");
    }

    #[test]
    fn bad_query_still_classifies_watch() {
        let info = resolve(Method::GET, "/api/v1/pods?watch=1&timeoutSeconds=abc");
        assert_eq!(info.verb, Verb::Watch);
    }

    #[test]
    fn proxy_keeps_remaining_path_out_of_subresource() {
        let info = resolve(Method::GET, "/api/v1/proxy/namespaces/default/pods/web-0/logs");
        assert_eq!(info.verb, Verb::Proxy);
        assert_eq!(info.name, "web-0");
        assert_eq!(info.subresource, "");
    }

    #[test]
    fn non_resource_paths() {
        assert!(!resolve(Method::GET, "/healthz").is_resource_request);
        assert!(!resolve(Method::GET, "/api/v1").is_resource_request);
        assert!(!resolve(Method::GET, "/apis/apps/v1").is_resource_request);
        assert!(!resolve(Method::GET, "/api/v1/watch").is_resource_request);
    }
}
