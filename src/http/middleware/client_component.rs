//! Client component identity.

use axum::http::header::USER_AGENT;

use super::{Exchange, Flow, Stage};
use crate::config::WorkingMode;
use crate::extract::client_component;

/// Derives the requesting component from the User-Agent header.
#[derive(Debug, Clone, Copy)]
pub struct ClientComponentExtraction {
    mode: WorkingMode,
}

impl ClientComponentExtraction {
    pub fn new(mode: WorkingMode) -> Self {
        Self { mode }
    }
}

impl Stage for ClientComponentExtraction {
    fn name(&self) -> &'static str {
        "client-component"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        if !exchange.info.is_resource_request {
            return Flow::Continue(exchange);
        }

        let user_agent = exchange.header(USER_AGENT).unwrap_or_default();
        if let Some(component) = client_component(user_agent, self.mode, exchange.context.convert_gvk()) {
            exchange.context.set_client_component(component);
        }
        Flow::Continue(exchange)
    }
}
