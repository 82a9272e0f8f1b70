//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → pieces handed to the pipeline stages at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AdmissionConfig, FilterConfig, GroupVersionResource, ListenerConfig, LogFormat,
    ObservabilityConfig, PoolScopeConfig, ProxyConfig, RemoteConfig, TenantConfig,
    TimeoutConfig, WorkingMode,
};
