//! Edge reverse proxy library.
//!
//! Requests from node-local clients pass through an interception pipeline
//! (classification, admission, deadlines, credential rewriting), are forwarded
//! to the remote API server, and have their response objects rewritten by the
//! object filter chain on the way back.

pub mod config;
pub mod extract;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use filter::{FilterRegistry, FilterSet};
pub use http::{HttpServer, Pipeline};
pub use lifecycle::Shutdown;
