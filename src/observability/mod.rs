//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (in-flight gauges, rejection counters, latency histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request identity (verb, resource, client) travels as structured fields
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
