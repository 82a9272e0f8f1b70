//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span)
//!     → request.rs (classify into a RequestDescriptor)
//!     → middleware (interception pipeline, fills context.rs)
//!     → forward.rs (remote server; 410 on a watch → relist.rs)
//!     → response.rs (Status documents for locally produced errors)
//!     → Send to client
//! ```

pub mod context;
pub mod forward;
pub mod middleware;
pub mod relist;
pub mod request;
pub mod response;
pub mod server;

pub use context::RequestContext;
pub use forward::{ForwardError, Forwarder, RemoteForwarder};
pub use middleware::Pipeline;
pub use request::{RequestDescriptor, RequestInfoLayer, Verb};
pub use server::HttpServer;
