//! # Status Updates
//!
//! Records the outcome of a reconciliation on the `SopsSecret` and decides
//! when to look at it again.

use crate::constants::{EVENT_REASON_PROCESSING_ERROR, STATUS_WRITE_RETRY};
use crate::controller::reconciler::status::backoff::{
    capitalize_first, compute_next_delay, StatusSnapshot,
};
use crate::controller::reconciler::types::{
    OperationResult, ReconcileResult, Reconciler, ReconcilerError, RequestScope,
};
use crate::crd::{SopsSecret, SopsSecretStatus, StatusValue};
use crate::observability::metrics;
use kube::runtime::events::EventType;
use tracing::{debug, error, info};

/// Handle a failed attempt: warn, persist `Failure`, back off
pub async fn manage_error(
    reconciler: &Reconciler,
    scope: &RequestScope,
    sops_secret: &SopsSecret,
    issue: &ReconcilerError,
) -> ReconcileResult {
    debug!(parent: &scope.span, "handling reconciliation error");
    metrics::increment_reconciliation_errors();

    let message = issue.to_string();
    reconciler.events.publish(
        sops_secret,
        EventType::Warning,
        EVENT_REASON_PROCESSING_ERROR,
        &capitalize_first(&message),
    );

    let snapshot = StatusSnapshot::of(sops_secret);
    let now = reconciler.now();
    let status = SopsSecretStatus::failure(now, message.clone());

    if let Err(e) = reconciler
        .store
        .update_sops_secret_status(sops_secret, &status)
        .await
    {
        error!(parent: &scope.span, "unable to update status: {}", e);
        metrics::increment_status_write_errors();
        metrics::increment_requeues("status_write");
        return ReconcileResult::requeue(STATUS_WRITE_RETRY);
    }

    let requeue_after = compute_next_delay(&snapshot, now);
    if let ReconcilerError::Decryption { file_name, source } = issue {
        error!(
            parent: &scope.span,
            file.name = %file_name,
            error.reason = source.reason.as_str(),
            "decryption failed"
        );
    }
    error!(
        parent: &scope.span,
        requeue_after_secs = requeue_after.as_secs(),
        "failed to reconcile SopsSecret: {}",
        message
    );
    metrics::increment_requeues("backoff");
    ReconcileResult::requeue(requeue_after)
}

/// Handle a successful apply: persist `Success` and announce the change
///
/// An unchanged Secret produces no write when the status already says
/// `Success`; otherwise the status is brought up to date without an event.
pub async fn manage_success(
    reconciler: &Reconciler,
    scope: &RequestScope,
    sops_secret: &SopsSecret,
    result: OperationResult,
) -> ReconcileResult {
    debug!(parent: &scope.span, "handling reconciliation success");

    let already_succeeded = sops_secret
        .status
        .as_ref()
        .is_some_and(|status| status.status_value == StatusValue::Success);
    if result == OperationResult::Unchanged && already_succeeded {
        debug!(parent: &scope.span, "secret unchanged, skipping status update");
        return ReconcileResult::done();
    }

    let status = SopsSecretStatus::success(reconciler.now());
    if let Err(e) = reconciler
        .store
        .update_sops_secret_status(sops_secret, &status)
        .await
    {
        error!(parent: &scope.span, "unable to update status: {}", e);
        metrics::increment_status_write_errors();
        metrics::increment_requeues("status_write");
        reconciler.events.publish(
            sops_secret,
            EventType::Warning,
            EVENT_REASON_PROCESSING_ERROR,
            "Unable to update status",
        );
        return ReconcileResult::requeue(STATUS_WRITE_RETRY);
    }

    let verb = match result {
        OperationResult::Created => "Created",
        OperationResult::Updated => "Updated",
        OperationResult::Unchanged => {
            info!(parent: &scope.span, "status updated successfully: secret up to date");
            return ReconcileResult::done();
        }
    };
    let message = format!("{verb} secret: {}", scope.name);
    info!(parent: &scope.span, "status updated successfully: {}", message);
    reconciler
        .events
        .publish(sops_secret, EventType::Normal, verb, &message);

    ReconcileResult::done()
}
