//! Collection selector extraction.

use super::{Exchange, Flow, Stage};
use crate::extract::{selector_string, ListOptions};
use crate::http::request::Verb;

/// Stores the normalized `label&field` selector of a collection list.
///
/// Decode failures are logged and leave the context unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorExtraction;

impl Stage for SelectorExtraction {
    fn name(&self) -> &'static str {
        "selector"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        let info = &exchange.info;
        if !info.is_resource_request || info.verb != Verb::List || !info.name.is_empty() {
            return Flow::Continue(exchange);
        }

        match ListOptions::from_uri(&exchange.parts.uri) {
            Ok(opts) => {
                let selector = selector_string(opts.label_selector.as_ref(), opts.field_selector.as_ref());
                if !selector.is_empty() {
                    exchange.context.set_selector(selector);
                }
            }
            Err(e) => tracing::warn!(request = %exchange.info, error = %e, "Failed to decode list selectors"),
        }
        Flow::Continue(exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    fn extract(uri: &str) -> Option<String> {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        match SelectorExtraction.handle(Exchange::new(request)) {
            Flow::Continue(exchange) => exchange.context.selector().map(str::to_string),
            Flow::Respond(..) => panic!("selector stage must not answer"),
        }
    }

    #[test]
    fn label_then_field() {
        assert_eq!(
            extract("/api/v1/pods?labelSelector=app%3Dweb&fieldSelector=spec.nodeName%3Dnode-1").as_deref(),
            Some("app=web&spec.nodeName=node-1")
        );
    }

    #[test]
    fn single_side() {
        assert_eq!(extract("/api/v1/pods?labelSelector=app%3Dweb").as_deref(), Some("app=web"));
        assert_eq!(
            extract("/api/v1/pods?fieldSelector=spec.nodeName%3Dnode-1").as_deref(),
            Some("spec.nodeName=node-1")
        );
    }

    #[test]
    fn empty_or_not_applicable() {
        assert_eq!(extract("/api/v1/pods"), None);
        assert_eq!(extract("/api/v1/pods?labelSelector=app%3Dweb&watch=true"), None);
        assert_eq!(extract("/api/v1/nodes?fieldSelector=metadata.name%3Dnode-1"), None);
    }

    #[test]
    fn decode_failure_is_not_fatal() {
        assert_eq!(extract("/api/v1/pods?labelSelector=app%3Dweb&limit=many"), None);
    }
}
