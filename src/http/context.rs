//! Per-request context carrier.
//!
//! Facts derived by the pipeline stages and read by the forwarding
//! collaborator and the tracer. One instance per request, never shared.

use axum::http::Uri;

use crate::extract::ListOptions;
use crate::http::request::{GroupVersionKind, RequestDescriptor, Verb};

/// Derived per-request facts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    client_component: Option<String>,
    pool_scope: bool,
    selector: Option<String>,
    content_type: Option<String>,
    convert_gvk: Option<GroupVersionKind>,
    can_cache: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requesting client identity, derived from User-Agent.
    pub fn client_component(&self) -> Option<&str> {
        self.client_component.as_deref()
    }

    pub fn set_client_component(&mut self, component: impl Into<String>) {
        self.client_component = Some(component.into());
    }

    /// Whether the request lists/watches pool-scope aggregated metadata.
    pub fn is_pool_scope(&self) -> bool {
        self.pool_scope
    }

    pub fn set_pool_scope(&mut self, pool_scope: bool) {
        self.pool_scope = pool_scope;
    }

    /// Normalized `label&field` selector string of a collection list.
    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn set_selector(&mut self, selector: impl Into<String>) {
        self.selector = Some(selector.into());
    }

    /// Media type the client asked for.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Resource type override for partial object metadata requests.
    pub fn convert_gvk(&self) -> Option<&GroupVersionKind> {
        self.convert_gvk.as_ref()
    }

    pub fn set_convert_gvk(&mut self, gvk: GroupVersionKind) {
        self.convert_gvk = Some(gvk);
    }

    /// Whether the client explicitly asked for its response to be cached.
    pub fn can_cache(&self) -> bool {
        self.can_cache
    }

    pub fn set_can_cache(&mut self, can_cache: bool) {
        self.can_cache = can_cache;
    }
}

fn is_kubelet(ctx: &RequestContext) -> bool {
    ctx.client_component() == Some("kubelet")
}

/// Node heartbeat lease traffic from the kubelet.
pub fn is_kubelet_lease_request(info: &RequestDescriptor, ctx: &RequestContext) -> bool {
    is_kubelet(ctx) && info.resource == "leases"
}

/// Kubelet reading its own node object.
pub fn is_kubelet_get_node_request(info: &RequestDescriptor, ctx: &RequestContext) -> bool {
    is_kubelet(ctx) && info.resource == "nodes" && info.verb == Verb::Get
}

/// Kubelet creating or reading a subject access review.
pub fn is_subject_access_review_create_get_request(info: &RequestDescriptor, ctx: &RequestContext) -> bool {
    info.is_resource_request
        && is_kubelet(ctx)
        && info.resource == "subjectaccessreviews"
        && matches!(info.verb, Verb::Create | Verb::Get)
}

/// Any client creating an event.
pub fn is_event_create_request(info: &RequestDescriptor) -> bool {
    info.is_resource_request && info.resource == "events" && info.verb == Verb::Create
}

/// A list request narrowed to a single object through `metadata.name`.
pub fn is_list_request_with_name_field_selector(info: &RequestDescriptor, uri: &Uri) -> bool {
    if !info.is_resource_request || info.verb != Verb::List {
        return false;
    }
    ListOptions::from_uri(uri)
        .ok()
        .and_then(|opts| opts.field_selector)
        .is_some_and(|fs| fs.requires_exact_match("metadata.name").is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn kubelet() -> RequestContext {
        let mut ctx = RequestContext::new();
        ctx.set_client_component("kubelet");
        ctx
    }

    fn resolve(method: Method, uri: &str) -> RequestDescriptor {
        RequestDescriptor::resolve(&method, &uri.parse().unwrap())
    }

    #[test]
    fn empty_context_has_no_facts() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.client_component(), None);
        assert_eq!(ctx.selector(), None);
        assert!(!ctx.is_pool_scope());
        assert!(!ctx.can_cache());
    }

    #[test]
    fn kubelet_predicates() {
        let lease = resolve(Method::PUT, "/apis/coordination.k8s.io/v1/namespaces/kube-node-lease/leases/node-1");
        assert!(is_kubelet_lease_request(&lease, &kubelet()));
        assert!(!is_kubelet_lease_request(&lease, &RequestContext::new()));

        let node = resolve(Method::GET, "/api/v1/nodes/node-1");
        assert!(is_kubelet_get_node_request(&node, &kubelet()));

        let sar = resolve(Method::POST, "/apis/authorization.k8s.io/v1/subjectaccessreviews");
        assert!(is_subject_access_review_create_get_request(&sar, &kubelet()));
    }

    #[test]
    fn list_with_name_field_selector() {
        let uri: Uri = "/api/v1/nodes?fieldSelector=metadata.name%3Dnode-1".parse().unwrap();
        let info = RequestDescriptor::resolve(&Method::GET, &uri);
        assert!(is_list_request_with_name_field_selector(&info, &uri));

        let uri: Uri = "/api/v1/nodes?fieldSelector=spec.unschedulable%3Dfalse".parse().unwrap();
        let info = RequestDescriptor::resolve(&Method::GET, &uri);
        assert!(!is_list_request_with_name_field_selector(&info, &uri));
    }

    #[test]
    fn event_create() {
        let info = resolve(Method::POST, "/api/v1/namespaces/default/events");
        assert!(is_event_create_request(&info));
        let list = resolve(Method::GET, "/api/v1/namespaces/default/events");
        assert!(!is_event_create_request(&list));
    }
}
