//! Edge proxy binary.
//!
//! ```text
//!   node clients ──▶ listener ──▶ pipeline ──▶ remote API server
//!                                   │
//!        responses ◀── object filters ◀──┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use edge_proxy::config::loader::load_config;
use edge_proxy::config::ProxyConfig;
use edge_proxy::filter::{FilterRegistry, FilterSettings};
use edge_proxy::http::{HttpServer, Pipeline, RemoteForwarder};
use edge_proxy::lifecycle::{shutdown_signal, Shutdown};
use edge_proxy::observability::{logging::init_logging, metrics::init_metrics};
use edge_proxy::security::TenantCredentialCache;

#[derive(Debug, Parser)]
#[command(name = "edge-proxy", version, about = "Edge reverse proxy for node-local API clients")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        remote = %config.remote.server_url,
        max_in_flight = config.admission.max_in_flight,
        working_mode = ?config.working_mode,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();

    let tenant = Arc::new(TenantCredentialCache::new(config.tenant.namespace.clone()));
    if let Some(path) = config.tenant.token_file.as_deref().map(PathBuf::from) {
        if let Err(e) = tenant.load_token_file(&path).await {
            tracing::warn!(error = %e, "Tenant token not loaded, credentials are not rewritten until a refresh succeeds");
        }
        if config.tenant.refresh_secs > 0 {
            let every = Duration::from_secs(config.tenant.refresh_secs);
            tokio::spawn(tenant.clone().refresh_token_file(path, every, shutdown.subscribe()));
        }
    }

    let filters = FilterRegistry::with_builtins(config.filters.disabled.iter().cloned())
        .build(&FilterSettings::from(&config.filters))?;
    let forwarder = Arc::new(RemoteForwarder::new(&config.remote)?);
    let pipeline = Arc::new(Pipeline::from_config(&config, forwarder, filters, tenant));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.trigger();
    });

    HttpServer::new(config, pipeline)
        .run(listener, shutdown.wait())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
