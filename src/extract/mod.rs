//! Request metadata extractors.
//!
//! Pure functions over headers and query parameters. They never touch the
//! request itself; the pipeline stages decide what to do with a failure.

pub mod accept;
pub mod component;
pub mod list_options;
pub mod selector;

use thiserror::Error;

pub use accept::{parse_accept, partial_object_metadata, requested_content_type, MediaRange};
pub use component::client_component;
pub use list_options::ListOptions;
pub use selector::{selector_string, FieldSelector, LabelSelector};

/// Failure to decode a request-level fact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid query: {0}")]
    Query(String),

    #[error("invalid value {value:?} for {name}")]
    Integer { name: &'static str, value: String },

    #[error("invalid label selector {selector:?}: {reason}")]
    LabelSelector { selector: String, reason: String },

    #[error("invalid field selector {selector:?}: {reason}")]
    FieldSelector { selector: String, reason: String },

    #[error("unknown group({0}) for partialobjectmetadata request")]
    UnknownGroup(String),

    #[error("unknown version({0}) for partialobjectmetadata request")]
    UnknownVersion(String),
}
