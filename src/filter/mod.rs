//! Object filter subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     FilterRegistry (name → factory, minus disabled names)
//!     → build(settings) → FilterSet (read-only, shared)
//!
//! Per request:
//!     FilterSet::chain_for(resource, verb) → FilterChain
//!     → response.rs decodes objects from the remote answer
//!     → each filter: filter(object, cancel) → object
//!     → re-encoded body to the client
//! ```
//!
//! # Design Decisions
//! - Filters are pure and idempotent; unknown kinds pass through unchanged
//! - Enablement is decided once at startup, never per request
//! - A filter declares the (resource, verb) pairs it is eligible for

pub mod masterservice;
pub mod object;
pub mod podenv;
pub mod registry;
pub mod response;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::http::request::Verb;

pub use object::Object;
pub use registry::{FilterChain, FilterRegistry, FilterSet, FilterSettings};

/// Names of the filters compiled into the proxy.
pub const BUILTIN_FILTERS: &[&str] = &[masterservice::FILTER_NAME, podenv::FILTER_NAME];

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to create filter {name}: {reason}")]
    Build { name: String, reason: String },

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to encode filtered object: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A named object mutator.
pub trait ObjectFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resources this filter handles, with the verbs for each.
    fn supported_resource_verbs(&self) -> &'static [(&'static str, &'static [Verb])];

    /// Mutate an object. Objects of unsupported kinds must come back unchanged.
    fn filter(&self, object: Object, cancel: &CancellationToken) -> Object;

    fn supports(&self, resource: &str, verb: Verb) -> bool {
        self.supported_resource_verbs()
            .iter()
            .any(|(r, verbs)| *r == resource && verbs.contains(&verb))
    }
}
