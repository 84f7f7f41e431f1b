//! # Reconcile
//!
//! One reconciliation of a `SopsSecret` key: load, check ownership, decrypt,
//! apply, record status.

use crate::constants::APPLY_CONFLICT_RETRIES;
use crate::controller::reconciler::secret::{build_secret, check_ownership};
use crate::controller::reconciler::status::{manage_error, manage_success};
use crate::controller::reconciler::types::{
    OperationResult, ReconcileResult, Reconciler, ReconcilerError, RequestScope,
};
use crate::crd::SopsSecret;
use crate::observability::metrics;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

impl Reconciler {
    /// Reconcile the `SopsSecret` identified by `namespace`/`name`
    ///
    /// Failures past loading are recorded in the resource status and turned
    /// into a requeue, so the only error surfaced is
    /// [`ReconcilerError::Load`].
    ///
    /// # Errors
    ///
    /// Returns [`ReconcilerError::Load`] when the `SopsSecret` cannot be read.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileResult, ReconcilerError> {
        let scope = RequestScope::new(namespace, name);
        let span = scope.span.clone();
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = self.reconcile_scoped(&scope).instrument(span).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        result
    }

    async fn reconcile_scoped(
        &self,
        scope: &RequestScope,
    ) -> Result<ReconcileResult, ReconcilerError> {
        info!(parent: &scope.span, "reconciling SopsSecret");

        let Some(sops_secret) = self
            .store
            .get_sops_secret(&scope.namespace, &scope.name)
            .await
            .map_err(ReconcilerError::Load)?
        else {
            debug!(parent: &scope.span, "SopsSecret not found, nothing to do");
            return Ok(ReconcileResult::done());
        };

        let result = match apply_secret(self, scope, &sops_secret).await {
            Ok(result) => {
                metrics::increment_secrets_applied(result.as_str());
                manage_success(self, scope, &sops_secret, result).await
            }
            Err(e) => manage_error(self, scope, &sops_secret, &e).await,
        };
        Ok(result)
    }
}

/// Create or update the Secret produced from `sops_secret`
///
/// Ownership is checked before anything is decrypted, and every payload is
/// decrypted before anything is written. A write conflict re-reads the Secret
/// and rebuilds it from the already decrypted data.
///
/// # Errors
///
/// Ownership conflicts, decryption failures and store failures.
pub async fn apply_secret(
    reconciler: &Reconciler,
    scope: &RequestScope,
    sops_secret: &SopsSecret,
) -> Result<OperationResult, ReconcilerError> {
    debug!(parent: &scope.span, "handling Secret update");

    let mut existing = reconciler
        .store
        .get_secret(&scope.namespace, &scope.name)
        .await
        .map_err(ReconcilerError::Apply)?;
    check_ownership(existing.as_ref(), sops_secret)?;

    let data = decrypt_all(reconciler, scope, sops_secret).await?;

    let mut attempt = 1;
    loop {
        let desired = build_secret(sops_secret, existing.as_ref(), data.clone())?;

        let outcome = match &existing {
            None => reconciler
                .store
                .create_secret(&desired)
                .await
                .map(|_| OperationResult::Created),
            Some(current) if *current == desired => return Ok(OperationResult::Unchanged),
            Some(_) => reconciler
                .store
                .replace_secret(&desired)
                .await
                .map(|_| OperationResult::Updated),
        };

        match outcome {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() && attempt < APPLY_CONFLICT_RETRIES => {
                warn!(
                    parent: &scope.span,
                    "write conflict on secret (attempt {}/{}), re-reading: {}",
                    attempt,
                    APPLY_CONFLICT_RETRIES,
                    e
                );
                attempt += 1;
                existing = reconciler
                    .store
                    .get_secret(&scope.namespace, &scope.name)
                    .await
                    .map_err(ReconcilerError::Apply)?;
                check_ownership(existing.as_ref(), sops_secret)?;
            }
            Err(e) => return Err(ReconcilerError::Apply(e)),
        }
    }
}

async fn decrypt_all(
    reconciler: &Reconciler,
    scope: &RequestScope,
    sops_secret: &SopsSecret,
) -> Result<BTreeMap<String, ByteString>, ReconcilerError> {
    let mut data = BTreeMap::new();
    for (file_name, encrypted) in &sops_secret.spec.string_data {
        debug!(parent: &scope.span, file.name = %file_name, "decrypting data");
        let decrypted = reconciler
            .decryptor
            .decrypt(file_name, encrypted)
            .await
            .map_err(|source| ReconcilerError::Decryption {
                file_name: file_name.clone(),
                source,
            })?;
        data.insert(file_name.clone(), ByteString(decrypted));
    }
    Ok(data)
}
