//! # Leader Election
//!
//! Lease-based leader election so that only one replica reconciles at a time.
//!
//! The replica holding the `coordination.k8s.io/v1` Lease named by
//! `leader_election_id` runs the controllers. Standby replicas retry every
//! `retry_period` and take over once the holder stops renewing for
//! `lease_duration`. A leader that cannot renew within `renew_deadline` gives
//! up leadership and the watch loop shuts down.

use crate::config::ControllerConfig;
use crate::controller::server::ServerState;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::PostParams;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What to do with the current Lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseDecision {
    /// No Lease exists yet
    Create,
    /// We hold the Lease
    Renew,
    /// The Lease is free or its holder stopped renewing
    TakeOver,
    /// Another replica holds a live Lease
    Wait { holder: String },
}

/// Decide whether `identity` may hold `lease` at `now`
#[must_use]
pub fn lease_decision(
    lease: Option<&Lease>,
    identity: &str,
    now: DateTime<Utc>,
    default_duration: Duration,
) -> LeaseDecision {
    let Some(lease) = lease else {
        return LeaseDecision::Create;
    };
    let spec = lease.spec.clone().unwrap_or_default();

    let holder = spec.holder_identity.unwrap_or_default();
    if holder.is_empty() {
        return LeaseDecision::TakeOver;
    }
    if holder == identity {
        return LeaseDecision::Renew;
    }

    let duration = spec
        .lease_duration_seconds
        .and_then(|secs| u64::try_from(secs).ok())
        .map_or(default_duration, Duration::from_secs);
    let last_renewal = spec.renew_time.or(spec.acquire_time).map(|t| t.0);
    let expired = match (last_renewal, chrono::Duration::from_std(duration)) {
        (Some(renewed), Ok(duration)) => renewed + duration < now,
        _ => true,
    };

    if expired {
        LeaseDecision::TakeOver
    } else {
        LeaseDecision::Wait { holder }
    }
}

/// Lease to write for `decision`, based on the current Lease if one exists
#[must_use]
pub fn next_lease(
    current: Option<Lease>,
    name: &str,
    identity: &str,
    now: DateTime<Utc>,
    lease_duration: Duration,
    decision: &LeaseDecision,
) -> Lease {
    let mut lease = current.unwrap_or_else(|| Lease {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        spec: None,
    });
    let previous = lease.spec.take().unwrap_or_default();
    let duration_secs = i32::try_from(lease_duration.as_secs()).unwrap_or(i32::MAX);

    let (acquire_time, transitions) = match decision {
        LeaseDecision::Renew => (
            previous.acquire_time.clone().or(Some(MicroTime(now))),
            previous.lease_transitions.unwrap_or(0),
        ),
        LeaseDecision::TakeOver => (
            Some(MicroTime(now)),
            previous.lease_transitions.unwrap_or(0).saturating_add(1),
        ),
        LeaseDecision::Create | LeaseDecision::Wait { .. } => (Some(MicroTime(now)), 0),
    };

    lease.spec = Some(LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(duration_secs),
        acquire_time,
        renew_time: Some(MicroTime(now)),
        lease_transitions: Some(transitions),
        ..previous
    });
    lease
}

/// Identity written into the Lease: the pod name, else the hostname
#[must_use]
pub fn holder_identity() -> String {
    ["POD_NAME", "HOSTNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| crate::constants::OPERATOR_NAME.to_string())
}

/// Lease-based leader elector
pub struct LeaderElector {
    api: Api<Lease>,
    name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElector")
            .field("lease", &format!("{}/{}", self.namespace, self.name))
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    /// Elector for the Lease configured in `config`
    ///
    /// An empty `leader_election_namespace` falls back to the client's default
    /// namespace, which in-cluster is the operator's own namespace.
    #[must_use]
    pub fn new(client: Client, config: &ControllerConfig) -> Self {
        let namespace = if config.leader_election_namespace.is_empty() {
            client.default_namespace().to_string()
        } else {
            config.leader_election_namespace.clone()
        };
        Self {
            api: Api::namespaced(client, &namespace),
            name: config.leader_election_id.clone(),
            namespace,
            identity: holder_identity(),
            lease_duration: config.lease_duration,
            renew_deadline: config.renew_deadline,
            retry_period: config.retry_period,
        }
    }

    /// Create, renew or take over the Lease
    ///
    /// Returns `Ok(true)` while we hold it. Losing a write race is not an error.
    ///
    /// # Errors
    ///
    /// Returns API errors other than conflicts.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, kube::Error> {
        let current = self.api.get_opt(&self.name).await?;
        let now = Utc::now();
        let decision = lease_decision(current.as_ref(), &self.identity, now, self.lease_duration);

        if let LeaseDecision::Wait { holder } = &decision {
            debug!("Lease {}/{} is held by {}", self.namespace, self.name, holder);
            return Ok(false);
        }

        let exists = current.is_some();
        let lease = next_lease(
            current,
            &self.name,
            &self.identity,
            now,
            self.lease_duration,
            &decision,
        );
        let result = if exists {
            self.api
                .replace(&self.name, &PostParams::default(), &lease)
                .await
        } else {
            self.api.create(&PostParams::default(), &lease).await
        };

        match result {
            Ok(_) => {
                if decision != LeaseDecision::Renew {
                    info!(
                        "Acquired lease {}/{} as {}",
                        self.namespace, self.name, self.identity
                    );
                }
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!("Lost lease race for {}/{}: {}", self.namespace, self.name, e.message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Block until the Lease is held
    ///
    /// Returns `false` when shutdown is requested before that happens.
    pub async fn acquire(&self, server_state: &ServerState) -> bool {
        info!(
            "Attempting to acquire leader lease {}/{}...",
            self.namespace, self.name
        );
        loop {
            if !server_state.is_ready() {
                return false;
            }
            match self.try_acquire_or_renew().await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!("Failed to acquire lease {}/{}: {}", self.namespace, self.name, e),
            }
            tokio::time::sleep(self.retry_period).await;
        }
    }

    /// Renew the Lease in the background
    ///
    /// When no renewal succeeds within `renew_deadline`, `lost` is set, the
    /// server is marked not ready, and the task ends.
    pub fn keep_leading(
        self,
        server_state: Arc<ServerState>,
        lost: watch::Sender<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_renewal = Instant::now();
            loop {
                tokio::time::sleep(self.retry_period).await;
                if !server_state.is_ready() {
                    return;
                }

                match self.try_acquire_or_renew().await {
                    Ok(true) => {
                        last_renewal = Instant::now();
                        continue;
                    }
                    Ok(false) => {
                        warn!("Lease {}/{} taken by another replica", self.namespace, self.name);
                    }
                    Err(e) => {
                        warn!("Failed to renew lease {}/{}: {}", self.namespace, self.name, e);
                    }
                }

                if last_renewal.elapsed() >= self.renew_deadline {
                    error!(
                        "Leader election lost: lease {}/{} not renewed within {}s",
                        self.namespace,
                        self.name,
                        self.renew_deadline.as_secs()
                    );
                    server_state.set_ready(false);
                    let _ = lost.send(true);
                    return;
                }
            }
        })
    }
}

/// Resolves once `lost` is set, or never when the sender is gone
pub async fn leadership_lost(mut lost: watch::Receiver<bool>) {
    loop {
        let is_lost = *lost.borrow_and_update();
        if is_lost {
            return;
        }
        if lost.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DURATION: Duration = Duration::from_secs(15);

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn lease(holder: Option<&str>, renewed: Option<i64>) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some("sops-operator-lock".to_string()),
                resource_version: Some("42".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: holder.map(ToString::to_string),
                lease_duration_seconds: Some(15),
                acquire_time: Some(MicroTime(at(0))),
                renew_time: renewed.map(|s| MicroTime(at(s))),
                lease_transitions: Some(2),
                ..LeaseSpec::default()
            }),
        }
    }

    #[test]
    fn test_missing_lease_is_created() {
        assert_eq!(lease_decision(None, "pod-a", at(0), DURATION), LeaseDecision::Create);
    }

    #[test]
    fn test_own_lease_is_renewed() {
        let current = lease(Some("pod-a"), Some(0));
        assert_eq!(
            lease_decision(Some(&current), "pod-a", at(100), DURATION),
            LeaseDecision::Renew
        );
    }

    #[test]
    fn test_live_foreign_lease_is_respected() {
        let current = lease(Some("pod-b"), Some(10));
        assert_eq!(
            lease_decision(Some(&current), "pod-a", at(20), DURATION),
            LeaseDecision::Wait {
                holder: "pod-b".to_string()
            }
        );
    }

    #[test]
    fn test_expired_or_released_lease_is_taken_over() {
        let expired = lease(Some("pod-b"), Some(10));
        assert_eq!(
            lease_decision(Some(&expired), "pod-a", at(26), DURATION),
            LeaseDecision::TakeOver
        );

        let released = lease(None, Some(10));
        assert_eq!(
            lease_decision(Some(&released), "pod-a", at(11), DURATION),
            LeaseDecision::TakeOver
        );

        let never_renewed = Lease {
            spec: Some(LeaseSpec {
                holder_identity: Some("pod-b".to_string()),
                ..LeaseSpec::default()
            }),
            ..lease(None, None)
        };
        assert_eq!(
            lease_decision(Some(&never_renewed), "pod-a", at(0), DURATION),
            LeaseDecision::TakeOver
        );
    }

    #[test]
    fn test_take_over_bumps_transitions_and_keeps_version() {
        let current = lease(Some("pod-b"), Some(10));
        let next = next_lease(
            Some(current),
            "sops-operator-lock",
            "pod-a",
            at(30),
            DURATION,
            &LeaseDecision::TakeOver,
        );
        let spec = next.spec.unwrap();
        assert_eq!(next.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(spec.holder_identity.as_deref(), Some("pod-a"));
        assert_eq!(spec.lease_transitions, Some(3));
        assert_eq!(spec.acquire_time, Some(MicroTime(at(30))));
        assert_eq!(spec.renew_time, Some(MicroTime(at(30))));
    }

    #[test]
    fn test_renew_keeps_acquire_time() {
        let current = lease(Some("pod-a"), Some(10));
        let spec = next_lease(
            Some(current),
            "sops-operator-lock",
            "pod-a",
            at(12),
            DURATION,
            &LeaseDecision::Renew,
        )
        .spec
        .unwrap();
        assert_eq!(spec.acquire_time, Some(MicroTime(at(0))));
        assert_eq!(spec.renew_time, Some(MicroTime(at(12))));
        assert_eq!(spec.lease_transitions, Some(2));
    }

    #[test]
    fn test_new_lease_is_named() {
        let next = next_lease(
            None,
            "sops-operator-lock",
            "pod-a",
            at(0),
            DURATION,
            &LeaseDecision::Create,
        );
        assert_eq!(next.metadata.name.as_deref(), Some("sops-operator-lock"));
        assert_eq!(next.spec.unwrap().lease_duration_seconds, Some(15));
    }

    #[tokio::test]
    async fn test_leadership_lost_resolves_when_set() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(leadership_lost(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_leadership_lost_pends_without_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let result = tokio::time::timeout(Duration::from_millis(50), leadership_lost(rx)).await;
        assert!(result.is_err());
    }
}
