//! Requested media type capture.

use axum::http::header::ACCEPT;

use super::{Exchange, Flow, Stage};
use crate::extract::requested_content_type;

/// Stores the bare media type of the first Accept clause.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeCapture;

impl Stage for ContentTypeCapture {
    fn name(&self) -> &'static str {
        "content-type"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        if !exchange.info.is_resource_request {
            return Flow::Continue(exchange);
        }

        if let Some(content_type) = exchange.header(ACCEPT).and_then(requested_content_type) {
            exchange.context.set_content_type(content_type);
        }
        Flow::Continue(exchange)
    }
}
