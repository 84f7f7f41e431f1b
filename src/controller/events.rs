//! # Events
//!
//! Best-effort Kubernetes Events attached to `SopsSecret` resources.
//!
//! Publishing never blocks or fails a reconciliation: the Kubernetes
//! implementation spawns the write and only logs failures.

use crate::constants::{CONTROLLER_NAME, EVENT_ACTION_RECONCILE};
use crate::crd::SopsSecret;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tracing::warn;

/// Fire-and-forget notification sink
pub trait EventPublisher: Send + Sync {
    fn publish(&self, resource: &SopsSecret, type_: EventType, reason: &str, message: &str);
}

/// Publishes events through the API server
#[derive(Clone)]
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl EventPublisher for KubeEventPublisher {
    fn publish(&self, resource: &SopsSecret, type_: EventType, reason: &str, message: &str) {
        let recorder = self.recorder.clone();
        let reference = resource.object_ref(&());
        let key = format!(
            "{}/{}",
            resource.namespace().unwrap_or_default(),
            resource.name_any()
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: EVENT_ACTION_RECONCILE.to_string(),
            secondary: None,
        };

        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&event, &reference).await {
                warn!("Failed to publish event {} for SopsSecret {}: {}", event.reason, key, e);
            }
        });
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _resource: &SopsSecret, _type: EventType, _reason: &str, _message: &str) {}
}
