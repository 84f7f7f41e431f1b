//! # Types
//!
//! Core types for the reconciler.

use crate::controller::events::EventPublisher;
use crate::controller::sops::{Decryptor, SopsDecryptionError};
use crate::controller::store::{ResourceStore, StoreError};
use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The `SopsSecret` could not be read; handled by the runtime error policy
    #[error("failed to load SopsSecret: {0}")]
    Load(#[source] StoreError),
    /// A Secret with the same name exists and is controlled by something else
    #[error("secret already exists and not owned by sops-operator")]
    Conflict,
    #[error("failed to update secret: {source}")]
    Decryption {
        file_name: String,
        #[source]
        source: SopsDecryptionError,
    },
    #[error("failed to update secret: {0}")]
    Apply(#[source] StoreError),
    #[error("failed to update secret: unable to set ownerReference: SopsSecret has no uid")]
    OwnerReference,
}

/// Outcome of applying the desired Secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl OperationResult {
    /// Metric label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::Unchanged => "unchanged",
        }
    }
}

/// Requeue decision returned by a reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    #[must_use]
    pub fn done() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

impl From<ReconcileResult> for Action {
    fn from(result: ReconcileResult) -> Self {
        match result.requeue_after {
            Some(after) => Action::requeue(after),
            None => Action::await_change(),
        }
    }
}

/// Identifies one reconciliation and carries its logging span
///
/// Engine functions log with `parent: &scope.span` so every event is
/// attributed to the request without relying on the ambient span.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub namespace: String,
    pub name: String,
    pub span: tracing::Span,
}

impl RequestScope {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        let span = tracing::info_span!(
            "sops_operator.reconcile",
            resource.namespace = namespace,
            resource.name = name,
        );
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            span,
        }
    }
}

/// Source of the current time, replaceable in tests
pub type Clock = fn() -> DateTime<Utc>;

#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ResourceStore>,
    pub decryptor: Arc<dyn Decryptor>,
    pub events: Arc<dyn EventPublisher>,
    pub clock: Clock,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        decryptor: Arc<dyn Decryptor>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            decryptor,
            events,
            clock: Utc::now,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}
