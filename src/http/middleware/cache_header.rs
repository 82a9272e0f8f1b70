//! Local cache directive.

use axum::http::HeaderName;

use super::{Exchange, Flow, Stage};

/// Request header a local client sets to ask for its response to be cached.
pub const EDGE_CACHE_HEADER: HeaderName = HeaderName::from_static("edge-cache");

/// Marks the request cacheable when asked to and strips the local-only header.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheHeaderCapture;

impl Stage for CacheHeaderCapture {
    fn name(&self) -> &'static str {
        "cache-header"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        if !exchange.info.is_resource_request {
            return Flow::Continue(exchange);
        }

        let requested = exchange
            .header(&EDGE_CACHE_HEADER)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        if requested {
            exchange.context.set_can_cache(true);
        }
        exchange.remove_header(&EDGE_CACHE_HEADER);
        Flow::Continue(exchange)
    }
}
