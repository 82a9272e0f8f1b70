//! Pool-scope metadata classification.

use std::collections::HashSet;

use axum::http::header::USER_AGENT;

use super::{Exchange, Flow, Stage};
use crate::config::{GroupVersionResource, PoolScopeConfig};

/// Marks list/watch requests for resources served from the pool-scope view.
///
/// Requests issued by the aggregation component itself are never marked,
/// otherwise its own upstream calls would loop back into the local view.
#[derive(Debug, Clone)]
pub struct PoolScopeClassifier {
    aggregator_user_agent: String,
    resources: HashSet<GroupVersionResource>,
}

impl PoolScopeClassifier {
    pub fn new(config: &PoolScopeConfig) -> Self {
        Self {
            aggregator_user_agent: config.user_agent.clone(),
            resources: config.resources.iter().cloned().collect(),
        }
    }

    fn is_pool_scope(&self, exchange: &Exchange) -> bool {
        if exchange.header(USER_AGENT) == Some(self.aggregator_user_agent.as_str()) {
            return false;
        }
        exchange.info.is_resource_request
            && exchange.info.is_list_or_watch()
            && self.resources.contains(&exchange.info.group_version_resource())
    }
}

impl Stage for PoolScopeClassifier {
    fn name(&self) -> &'static str {
        "pool-scope"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        let pool_scope = self.is_pool_scope(&exchange);
        exchange.context.set_pool_scope(pool_scope);
        Flow::Continue(exchange)
    }
}
