//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! get/list/watch request:
//!     → timeouts.rs (derive deadline from the client's own timeout)
//!     → Forwarding bounded by that deadline
//!     → On expiry: 504 before headers, body cut off after
//! ```
//!
//! # Design Decisions
//! - Deadlines follow the client's timeout, adjusted for edge round trips
//! - No retries here; retrying belongs to the client

pub mod timeouts;

pub use timeouts::TimeoutAdjuster;
