//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after classification):
//!     → admission.rs (take an in-flight slot or answer 429)
//!     → credentials.rs (swap system tokens for the tenant token)
//!     → Forwarding
//! ```
//!
//! # Design Decisions
//! - Overload is shed at the door, never queued
//! - Credential inspection is fail-open: unparseable tokens pass unchanged
//! - No signature checks; the remote server stays the only authenticator

pub mod admission;
pub mod credentials;

pub use admission::{AdmissionController, AdmissionToken};
pub use credentials::{CredentialRewriter, TenantCredentialCache, TenantCredentials};
