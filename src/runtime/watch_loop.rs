//! # Watch Loop
//!
//! Controller watch loop that monitors `SopsSecret` resources, and the
//! `Secret`s they own, and triggers reconciliation when changes are detected.
//!
//! One controller runs per watched namespace (or a single cluster-wide one);
//! their streams are merged and driven together. With leader election enabled
//! the controllers only start once this replica holds the leader Lease.
//!
//! `SopsSecret` events only trigger a reconciliation when `metadata.generation`
//! changes, so the operator's own status writes never requeue a resource ahead
//! of its failure backoff.

use crate::config::ControllerConfig;
use crate::constants::{WATCH_BACKOFF_MAX_MS, WATCH_BACKOFF_START_MS};
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::SopsSecret;
use crate::runtime::error_policy::{
    handle_controller_error, handle_reconciliation_error, reset_watch_backoff,
};
use crate::runtime::leader_election::{leadership_lost, LeaderElector};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::{predicates, reflector, watcher, Controller, WatchStreamExt};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Run the controller watch loop until a shutdown signal is received
///
/// # Errors
///
/// Fails when leadership is lost, so the process exits and a standby replica
/// takes over.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
) -> Result<(), anyhow::Error> {
    let shutdown_server_state = server_state.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    let (lost_tx, lost_rx) = watch::channel(false);
    let _renewal = if config.leader_election {
        let elector = LeaderElector::new(client.clone(), &config);
        if !elector.acquire(&server_state).await {
            info!("Shutdown requested before acquiring leadership");
            return Ok(());
        }
        info!("Leadership acquired, starting controllers");
        Some(elector.keep_leading(server_state.clone(), lost_tx))
    } else {
        info!("Leader election disabled");
        None
    };

    let backoff_ms = Arc::new(AtomicU64::new(WATCH_BACKOFF_START_MS));

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        let controllers = watched_apis(&client, &config.watch_namespaces)
            .into_iter()
            .map(|(sops_secrets, secrets)| {
                controller_stream(
                    sops_secrets,
                    secrets,
                    reconciler.clone(),
                    &config,
                    lost_rx.clone(),
                )
            });

        let backoff = backoff_ms.clone();
        let watch_restart_delay = config.watch_restart_delay_duration();
        stream::select_all(controllers)
            .filter_map(move |item| {
                let backoff = backoff.clone();
                async move {
                    match item {
                        Ok((object, _action)) => {
                            reset_watch_backoff(&backoff);
                            debug!(
                                "watch.event.success: {}/{}",
                                object.namespace.as_deref().unwrap_or_default(),
                                object.name
                            );
                            Some(())
                        }
                        Err(e) => {
                            handle_controller_error(
                                &e,
                                &backoff,
                                WATCH_BACKOFF_MAX_MS,
                                watch_restart_delay,
                            )
                            .await
                        }
                    }
                }
            })
            .for_each(|()| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if *lost_rx.borrow() {
            error!("Leadership lost, stopping controllers");
            return Err(anyhow::anyhow!("leader election lost"));
        }
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            config.watch_restart_delay_secs
        );
        tokio::time::sleep(config.watch_restart_delay_duration()).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

type ControllerItem = Result<
    (kube_runtime::reflector::ObjectRef<SopsSecret>, Action),
    controller::Error<ReconcilerError, watcher::Error>,
>;

/// `SopsSecret`/`Secret` API pairs, one per watched namespace
fn watched_apis(client: &Client, namespaces: &[String]) -> Vec<(Api<SopsSecret>, Api<Secret>)> {
    if namespaces.is_empty() {
        return vec![(Api::all(client.clone()), Api::all(client.clone()))];
    }
    namespaces
        .iter()
        .map(|ns| {
            (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            )
        })
        .collect()
}

/// Drop `SopsSecret` events that do not change `metadata.generation`
///
/// Status and metadata-only writes leave the generation untouched. The
/// reflector upstream still sees every event.
pub(crate) fn spec_changes<S>(
    objects: S,
) -> impl Stream<Item = Result<SopsSecret, watcher::Error>> + Send + 'static
where
    S: Stream<Item = Result<SopsSecret, watcher::Error>> + Send + 'static,
{
    objects.predicate_filter(predicates::generation)
}

fn controller_stream(
    sops_secrets: Api<SopsSecret>,
    secrets: Api<Secret>,
    reconciler: Arc<Reconciler>,
    config: &ControllerConfig,
    lost: watch::Receiver<bool>,
) -> BoxStream<'static, ControllerItem> {
    let requeue_after = config.reconciliation_error_requeue_duration();
    let controller_config =
        controller::Config::default().concurrency(config.max_concurrent_reconciliations);

    let (reader, writer) = reflector::store();
    let trigger = spec_changes(
        watcher(sops_secrets, watcher::Config::default().any_semantic())
            .default_backoff()
            .reflect(writer)
            .applied_objects(),
    );

    Controller::for_stream(trigger, reader)
        .owns(secrets, watcher::Config::default())
        .with_config(controller_config)
        .graceful_shutdown_on(leadership_lost(lost))
        .shutdown_on_signal()
        .run(
            reconcile,
            move |obj, error, ctx| handle_reconciliation_error(obj, error, ctx, requeue_after),
            reconciler,
        )
        .boxed()
}

async fn reconcile(obj: Arc<SopsSecret>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    ctx.reconcile(&namespace, &name).await.map(Action::from)
}
