//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, server startup,
//! Kubernetes client and reconciler wiring.

use crate::config::{ControllerConfig, LogFormat};
use crate::controller::events::KubeEventPublisher;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::sops::SopsBinaryDecryptor;
use crate::controller::store::KubeResourceStore;
use crate::observability;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop needs
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context shared by all controllers
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
///
/// # Errors
///
/// Fails when metrics cannot be registered, the HTTP server does not come up,
/// or no Kubernetes client configuration is available.
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must happen before any rustls connection is made.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    init_tracing(config.log_format)?;

    info!("Starting SOPS operator v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    if config.watch_namespaces.is_empty() {
        info!("Watching SopsSecrets in all namespaces");
    } else {
        info!(
            "Watching SopsSecrets in namespaces: {}",
            config.watch_namespaces.join(", ")
        );
    }

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::new());

    // Start server in background task
    let server_state_clone = server_state.clone();
    let metrics_addr = config.metrics_addr.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(&metrics_addr, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeResourceStore::new(client.clone())),
        Arc::new(SopsBinaryDecryptor::from_config(&config)),
        Arc::new(KubeEventPublisher::new(client.clone())),
    ));

    info!("Operator initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        config,
    })
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the default `sops_operator=info` filter.
fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "sops_operator=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ControllerConfig,
) -> Result<()> {
    let startup_timeout = config.server_startup_timeout_duration();
    let poll_interval = config.server_poll_interval_duration();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!(
                "HTTP server failed to start on {}",
                config.metrics_addr
            ));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
