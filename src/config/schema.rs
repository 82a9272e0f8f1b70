//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Remote control-plane API server.
    pub remote: RemoteConfig,

    /// In-flight admission limits.
    pub admission: AdmissionConfig,

    /// Pool-scope metadata classification.
    pub pool_scope: PoolScopeConfig,

    /// How client components are derived from User-Agent.
    pub working_mode: WorkingMode,

    /// Tenant credential settings.
    pub tenant: TenantConfig,

    /// Object filter settings.
    pub filters: FilterConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:10261").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:10261".to_string(),
        }
    }
}

/// Remote API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote API server (plain http).
    pub server_url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum concurrent ordinary requests. Zero or negative disables the gate.
    pub max_in_flight: i64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_in_flight: 250 }
    }
}

/// A (group, version, resource) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: impl Into<String>, version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

/// Pool-scope metadata configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolScopeConfig {
    /// User-Agent of the aggregation component itself. Its requests are never pool-scope.
    pub user_agent: String,

    /// Resources served from the pool-scope aggregated view.
    pub resources: Vec<GroupVersionResource>,
}

impl Default for PoolScopeConfig {
    fn default() -> Self {
        Self {
            user_agent: "multiplexer-proxy".to_string(),
            resources: vec![
                GroupVersionResource::new("", "v1", "services"),
                GroupVersionResource::new("discovery.k8s.io", "v1", "endpointslices"),
            ],
        }
    }
}

/// Working mode of the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkingMode {
    /// Client component is the User-Agent up to the first '/'.
    #[default]
    Edge,
    /// Client component is the whole lower-cased User-Agent.
    Cloud,
}

/// Tenant credential configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Namespace of the tenant this node belongs to. Empty disables rewriting.
    pub namespace: String,

    /// File holding the tenant's service account token.
    pub token_file: Option<String>,

    /// How often the token file is re-read, in seconds.
    pub refresh_secs: u64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            token_file: None,
            refresh_secs: 300,
        }
    }
}

/// Object filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    /// Names of filters that must not run.
    pub disabled: Vec<String>,

    /// Host the in-cluster API server address is rewritten to.
    pub master_service_host: String,

    /// Port the in-cluster API server address is rewritten to.
    pub master_service_port: u16,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outer timeout for requests without their own deadline, in seconds. Zero disables.
    pub request_secs: u64,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "127.0.0.1:10265".to_string(),
        }
    }
}
