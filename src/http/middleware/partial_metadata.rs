//! Partial object metadata negotiation.

use axum::http::header::ACCEPT;

use super::{Exchange, Flow, Stage};
use crate::extract::partial_object_metadata;

/// Records the canonical resource type a partial metadata request converts to.
///
/// An unrecognized group or version is logged and the request proceeds
/// without an override.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialMetadataNegotiation;

impl Stage for PartialMetadataNegotiation {
    fn name(&self) -> &'static str {
        "partial-metadata"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        if !exchange.info.is_resource_request {
            return Flow::Continue(exchange);
        }

        let accept = exchange.header(ACCEPT).unwrap_or_default();
        match partial_object_metadata(accept) {
            Ok(Some(gvk)) => exchange.context.set_convert_gvk(gvk),
            Ok(None) => {}
            Err(e) => tracing::error!(request = %exchange.info, error = %e, "Ignoring partial object metadata request"),
        }
        Flow::Continue(exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::GroupVersionKind;
    use axum::{body::Body, http::Request};

    fn negotiate(uri: &str, accept: &str) -> Option<GroupVersionKind> {
        let request = Request::get(uri).header(ACCEPT, accept).body(Body::empty()).unwrap();
        match PartialMetadataNegotiation.handle(Exchange::new(request)) {
            Flow::Continue(exchange) => exchange.context.convert_gvk().cloned(),
            Flow::Respond(..) => panic!("negotiation must not answer"),
        }
    }

    #[test]
    fn stores_canonical_override() {
        let gvk = negotiate(
            "/api/v1/pods",
            "application/json;as=PartialObjectMetadataList;g=meta.k8s.io;v=v1beta1",
        );
        assert_eq!(gvk, Some(GroupVersionKind::new("meta.k8s.io", "v1beta1", "PartialObjectMetadataList")));
    }

    #[test]
    fn unknown_group_fails_closed() {
        assert_eq!(negotiate("/api/v1/pods", "application/json;as=PartialObjectMetadata;g=apps;v=v1"), None);
    }

    #[test]
    fn non_resource_requests_are_skipped() {
        assert_eq!(
            negotiate("/version", "application/json;as=PartialObjectMetadata;g=meta.k8s.io;v=v1"),
            None
        );
    }
}
