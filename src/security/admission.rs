//! In-flight admission control.
//!
//! # Responsibilities
//! - Bound concurrent requests with two independent pools
//! - Reject excess load immediately with 429 and a retry hint
//!
//! # Design Decisions
//! - Non-blocking acquire: overload is shed, never queued
//! - The permit is an RAII token carried by the response body, so it is
//!   released exactly once whatever way the request ends
//! - A non-positive ordinary limit disables the ordinary gate

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::http::context::is_kubelet_lease_request;
use crate::http::middleware::{Exchange, Flow, Stage};
use crate::http::response::too_many_requests;
use crate::observability::metrics;

/// Capacity of the pool-scope metadata pool.
pub const POOL_SCOPE_CAPACITY: usize = 4096;

/// A held admission slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionToken {
    pool_scope: bool,
    _permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionToken {
    pub fn is_pool_scope(&self) -> bool {
        self.pool_scope
    }
}

/// Two-pool admission gate.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    ordinary: Option<Arc<Semaphore>>,
    pool_scope: Arc<Semaphore>,
}

impl AdmissionController {
    pub fn new(max_in_flight: i64) -> Self {
        let ordinary = usize::try_from(max_in_flight)
            .ok()
            .filter(|limit| *limit > 0)
            .map(|limit| Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS))));

        Self {
            ordinary,
            pool_scope: Arc::new(Semaphore::new(POOL_SCOPE_CAPACITY)),
        }
    }

    /// Try to take a slot without waiting.
    pub fn try_admit(&self, pool_scope: bool) -> Option<AdmissionToken> {
        let pool = if pool_scope {
            Some(&self.pool_scope)
        } else {
            self.ordinary.as_ref()
        };

        let permit = match pool {
            Some(pool) => Some(Arc::clone(pool).try_acquire_owned().ok()?),
            None => None,
        };
        Some(AdmissionToken { pool_scope, _permit: permit })
    }

    /// Free slots left in a pool; `None` when the pool is unlimited.
    pub fn available(&self, pool_scope: bool) -> Option<usize> {
        if pool_scope {
            Some(self.pool_scope.available_permits())
        } else {
            self.ordinary.as_ref().map(|pool| pool.available_permits())
        }
    }
}

impl Stage for AdmissionController {
    fn name(&self) -> &'static str {
        "admission"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        let pool_scope = exchange.context.is_pool_scope();

        match self.try_admit(pool_scope) {
            Some(token) => {
                if is_kubelet_lease_request(&exchange.info, &exchange.context) {
                    tracing::trace!(request = %exchange.info, available = ?self.available(pool_scope), "Request admitted");
                } else {
                    tracing::debug!(request = %exchange.info, pool_scope, available = ?self.available(pool_scope), "Request admitted");
                }
                exchange.held.admission = Some(token);
                Flow::Continue(exchange)
            }
            None => {
                tracing::error!(request = %exchange.info, pool_scope, "Too many requests, please try again later");
                metrics::record_rejected(pool_scope);
                let message = if pool_scope {
                    "Too many pool scope metadata requests, please try again later."
                } else {
                    "Too many requests, please try again later."
                };
                Flow::Respond(exchange, too_many_requests(message))
            }
        }
    }
}
