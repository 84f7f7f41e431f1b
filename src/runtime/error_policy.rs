//! # Error Policy
//!
//! Handles errors the reconciler hands back to the controller runtime and
//! errors on the watch streams.
//!
//! Only load failures of the `SopsSecret` itself reach the error policy;
//! every other failure is recorded in status and requeued by the reconciler.

use crate::constants::WATCH_BACKOFF_START_MS;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::SopsSecret;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn, Instrument};

/// Error policy passed to `Controller::run`
pub fn handle_reconciliation_error(
    obj: Arc<SopsSecret>,
    error: &ReconcilerError,
    _ctx: Arc<Reconciler>,
    requeue_after: Duration,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!(
        "Reconciliation error for {}/{}: {} (retrying in {}s)",
        namespace,
        name,
        error,
        requeue_after.as_secs()
    );
    observability::metrics::increment_reconciliation_errors();
    observability::metrics::increment_requeues("load_error");

    Action::requeue(requeue_after)
}

/// Classification of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old; the watcher relists on its own
    Expired,
    /// API server throttling or storage reinitializing
    Throttled,
    /// Watched object or CRD missing
    NotFound,
    Unknown,
}

/// Classify a watch stream error from its debug rendering
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_401 {
        WatchErrorKind::Unauthorized
    } else if is_410 {
        WatchErrorKind::Expired
    } else if is_429 {
        WatchErrorKind::Throttled
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Unknown
    }
}

/// Handle an error item from the controller stream
///
/// Returns `Some(())` when the item should be passed on and `None` when it is
/// dropped. Unauthorized, throttled and unknown errors pause the stream before
/// it resumes.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );

    async move {
        match classify_watch_error(error_string) {
            WatchErrorKind::Unauthorized => {
                error!(
                    "Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
                );
                error!(
                    "Verify the operator's ClusterRole still grants list/watch on sopssecrets.craftypath.github.io and secrets"
                );
                warn!(
                    "Waiting {}s before resuming watch (RBAC may need time to propagate)...",
                    watch_restart_delay.as_secs()
                );
                tokio::time::sleep(watch_restart_delay).await;
                observability::metrics::increment_requeues("watch_error");
                None
            }
            WatchErrorKind::Expired => {
                warn!(error_type = "410", "watch.error.resource_version_expired");
                None
            }
            WatchErrorKind::Throttled => {
                let current = backoff_ms.load(Ordering::Relaxed);
                warn!(
                    "API server throttling (429), backing off for {}ms before resuming...",
                    current
                );
                tokio::time::sleep(Duration::from_millis(current)).await;
                backoff_ms.store(next_watch_backoff(current, max_backoff_ms), Ordering::Relaxed);
                observability::metrics::increment_requeues("watch_error");
                None
            }
            WatchErrorKind::NotFound => {
                warn!(
                    "Resource not found (404) - expected if a SopsSecret was deleted or the CRD is missing. Error: {}",
                    error_string
                );
                Some(())
            }
            WatchErrorKind::Unknown => {
                error!("Controller stream error: {}", error_string);
                tokio::time::sleep(watch_restart_delay).await;
                observability::metrics::increment_requeues("watch_error");
                None
            }
        }
    }
    .instrument(error_span)
    .await
}

/// Handle an error item from a controller stream
///
/// Reconciler failures were already requeued by the error policy, so they pass
/// straight through. Only watch and queue errors are classified, and only they
/// may pause the merged stream.
pub async fn handle_controller_error(
    error: &controller::Error<ReconcilerError, watcher::Error>,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    if let controller::Error::ReconcilerFailed(err, object) = error {
        debug!(
            "Reconciliation of {}/{} failed and was requeued: {}",
            object.namespace.as_deref().unwrap_or_default(),
            object.name,
            err
        );
        return Some(());
    }
    handle_watch_stream_error(&format!("{error:?}"), backoff_ms, max_backoff_ms, watch_restart_delay)
        .await
}

/// Reset the throttling backoff after a successful event
pub fn reset_watch_backoff(backoff_ms: &AtomicU64) {
    backoff_ms.store(WATCH_BACKOFF_START_MS, Ordering::Relaxed);
}

fn next_watch_backoff(current_ms: u64, max_backoff_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(max_backoff_ms)
}
