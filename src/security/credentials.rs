//! Tenant credential substitution.
//!
//! # Responsibilities
//! - Hold the tenant's service account token (refreshed from outside)
//! - Swap system-namespace bearer tokens for the tenant token
//!
//! # Design Decisions
//! - Token claims are read without verifying the signature; the proxy is not
//!   the token's audience and only routes on the subject
//! - Every parse failure is fail-open: the original token is forwarded
//! - Readers take a lock-free snapshot and never wait for a refresh

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::{header::AUTHORIZATION, HeaderValue};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::http::middleware::{Exchange, Flow, Stage};

/// Namespace whose tokens are replaced by the tenant's.
pub const RESERVED_NAMESPACE: &str = "kube-system";

const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed bearer token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("subject {0:?} is not a service account")]
    Subject(String),

    #[error("failed to read token file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read access to the tenant's credential cache.
pub trait TenantCredentials: Send + Sync {
    /// Namespace the tenant lives in.
    fn tenant_namespace(&self) -> &str;

    /// Current tenant token, if one has been loaded.
    fn token(&self) -> Option<Arc<String>>;

    /// Whether the tenant cache is synchronized. Must not block.
    fn is_synced(&self) -> bool;
}

/// In-memory tenant credential cache.
#[derive(Debug)]
pub struct TenantCredentialCache {
    namespace: String,
    token: ArcSwap<String>,
    synced: AtomicBool,
}

impl TenantCredentialCache {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            token: ArcSwap::from_pointee(String::new()),
            synced: AtomicBool::new(false),
        }
    }

    /// Replace the token and mark the cache synchronized.
    pub fn update(&self, token: impl Into<String>) {
        let token = token.into();
        let synced = !token.is_empty();
        self.token.store(Arc::new(token));
        self.synced.store(synced, Ordering::Release);
    }

    /// Refresh the token from a projected token file.
    pub async fn load_token_file(&self, path: &Path) -> Result<(), CredentialError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|source| CredentialError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.update(content.trim());
        tracing::info!(path = %path.display(), namespace = %self.namespace, "Tenant token loaded");
        Ok(())
    }

    /// Re-read the token file every `every` until shutdown. A failed read
    /// keeps the previous token.
    pub async fn refresh_token_file(
        self: Arc<Self>,
        path: PathBuf,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.load_token_file(&path).await {
                        tracing::warn!(error = %e, "Tenant token refresh failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Tenant token refresh stopped");
                    return;
                }
            }
        }
    }
}

impl TenantCredentials for TenantCredentialCache {
    fn tenant_namespace(&self) -> &str {
        &self.namespace
    }

    fn token(&self) -> Option<Arc<String>> {
        let token = self.token.load_full();
        (!token.is_empty()).then_some(token)
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// Token from a `Bearer <token>` Authorization value.
pub fn parse_bearer_token(value: &str) -> Option<&str> {
    let rest = value.strip_prefix("Bearer ")?;
    let token = rest.split(' ').next().unwrap_or_default();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
}

/// Namespace of the service account a token was issued to.
pub fn service_account_namespace(token: &str) -> Result<String, CredentialError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    let subject = data.claims.sub;

    let (namespace, name) = subject
        .strip_prefix(SERVICE_ACCOUNT_PREFIX)
        .and_then(|rest| rest.split_once(':'))
        .ok_or_else(|| CredentialError::Subject(subject.clone()))?;
    if namespace.is_empty() || name.is_empty() || name.contains(':') {
        return Err(CredentialError::Subject(subject.clone()));
    }
    Ok(namespace.to_string())
}

/// Replaces system-namespace bearer tokens with the tenant token.
pub struct CredentialRewriter {
    tenant: Arc<dyn TenantCredentials>,
}

impl CredentialRewriter {
    pub fn new(tenant: Arc<dyn TenantCredentials>) -> Self {
        Self { tenant }
    }

    fn substitute(&self, exchange: &Exchange) -> Option<HeaderValue> {
        let token = exchange.header(AUTHORIZATION).and_then(parse_bearer_token)?;

        let namespace = match service_account_namespace(token) {
            Ok(namespace) => namespace,
            Err(e) => {
                tracing::error!(request = %exchange.info, error = %e, "Could not read tenant namespace from bearer token");
                return None;
            }
        };

        if namespace == self.tenant.tenant_namespace()
            || namespace != RESERVED_NAMESPACE
            || !self.tenant.is_synced()
        {
            return None;
        }

        let tenant_token = self.tenant.token()?;
        match HeaderValue::from_str(&format!("Bearer {tenant_token}")) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "Tenant token is not a valid header value");
                None
            }
        }
    }
}

impl Stage for CredentialRewriter {
    fn name(&self) -> &'static str {
        "credentials"
    }

    fn handle(&self, mut exchange: Exchange) -> Flow {
        if let Some(value) = self.substitute(&exchange) {
            tracing::debug!(request = %exchange.info, tenant = self.tenant.tenant_namespace(), "Replaced bearer token with tenant token");
            exchange.parts.headers.insert(AUTHORIZATION, value);
        }
        Flow::Continue(exchange)
    }
}
