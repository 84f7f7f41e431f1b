//! Common test utilities for reconciler integration tests
//!
//! In-memory replacements for the API server, the sops binary and the event
//! recorder, plus fixtures shared by every test file.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use sops_operator::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "test-namespace";
pub const NAME: &str = "test-secret";

/// Fixed "now" used by every reconciler built with [`reconciler`]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Timestamp the API server would stamp on a persisted object
pub fn creation_timestamp() -> Time {
    serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap()
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Object store with API-server-like semantics
///
/// Creates stamp a creation timestamp and resourceVersion, replaces reject a
/// stale resourceVersion with a conflict.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sops_secrets: Mutex<HashMap<Key, SopsSecret>>,
    secrets: Mutex<HashMap<Key, Secret>>,
    next_version: AtomicUsize,
    pub creates: AtomicUsize,
    pub replaces: AtomicUsize,
    pub status_writes: AtomicUsize,
    /// Fail every status write
    pub fail_status_writes: AtomicBool,
    /// Fail every `get_sops_secret`
    pub fail_loads: AtomicBool,
    /// Number of upcoming replaces that lose a race to a concurrent writer
    pub replace_conflicts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub fn insert_sops_secret(&self, sops_secret: SopsSecret) {
        let k = key(&sops_secret.namespace().unwrap_or_default(), &sops_secret.name_any());
        self.sops_secrets.lock().unwrap().insert(k, sops_secret);
    }

    /// Store `secret` as if it had been created through the API server
    pub fn insert_secret(&self, mut secret: Secret) {
        secret.metadata.creation_timestamp = Some(creation_timestamp());
        secret.metadata.resource_version = Some(self.version());
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        self.secrets.lock().unwrap().insert(k, secret);
    }

    pub fn delete_secret(&self, namespace: &str, name: &str) {
        self.secrets.lock().unwrap().remove(&key(namespace, name));
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn sops_secret(&self, namespace: &str, name: &str) -> Option<SopsSecret> {
        self.sops_secrets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn status(&self, namespace: &str, name: &str) -> Option<SopsSecretStatus> {
        self.sops_secret(namespace, name).and_then(|s| s.status)
    }

    /// Replace the spec of a stored SopsSecret, keeping its status
    pub fn update_spec(&self, namespace: &str, name: &str, update: impl FnOnce(&mut SopsSecretSpec)) {
        let mut guard = self.sops_secrets.lock().unwrap();
        let resource = guard.get_mut(&key(namespace, name)).unwrap();
        update(&mut resource.spec);
    }

    pub fn set_status(&self, namespace: &str, name: &str, status: SopsSecretStatus) {
        let mut guard = self.sops_secrets.lock().unwrap();
        guard.get_mut(&key(namespace, name)).unwrap().status = Some(status);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_sops_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SopsSecret>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        Ok(self.sops_secret(namespace, name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.secret(namespace, name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        let mut guard = self.secrets.lock().unwrap();
        if guard.contains_key(&k) {
            return Err(StoreError::Conflict(format!("secrets \"{}\" already exists", k.1)));
        }
        let mut stored = secret.clone();
        stored.metadata.creation_timestamp = Some(creation_timestamp());
        stored.metadata.resource_version = Some(self.version());
        guard.insert(k, stored.clone());
        Ok(stored)
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        let mut guard = self.secrets.lock().unwrap();
        let current = guard
            .get_mut(&k)
            .ok_or_else(|| StoreError::Backend(format!("secrets \"{}\" not found", k.1)))?;

        let pending = self.replace_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.replace_conflicts.store(pending - 1, Ordering::SeqCst);
            current.metadata.resource_version = Some(self.version());
        }
        if current.metadata.resource_version != secret.metadata.resource_version {
            return Err(StoreError::Conflict(
                "the object has been modified; please apply your changes to the latest version and try again"
                    .to_string(),
            ));
        }

        let mut stored = secret.clone();
        stored.metadata.resource_version = Some(self.version());
        *current = stored.clone();
        Ok(stored)
    }

    async fn update_sops_secret_status(
        &self,
        sops_secret: &SopsSecret,
        status: &SopsSecretStatus,
    ) -> Result<(), StoreError> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("etcdserver: request timed out".to_string()));
        }
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let k = key(&sops_secret.namespace().unwrap_or_default(), &sops_secret.name_any());
        let mut guard = self.sops_secrets.lock().unwrap();
        let stored = guard
            .get_mut(&k)
            .ok_or_else(|| StoreError::Backend("sopssecret not found".to_string()))?;
        stored.status = Some(status.clone());
        Ok(())
    }
}

/// Always returns the same plaintext
#[derive(Debug)]
pub struct StaticDecryptor {
    pub plaintext: Vec<u8>,
    pub calls: AtomicUsize,
}

impl StaticDecryptor {
    pub fn new(plaintext: &str) -> Arc<Self> {
        Arc::new(Self {
            plaintext: plaintext.as_bytes().to_vec(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl Decryptor for StaticDecryptor {
    async fn decrypt(&self, _file_name: &str, _encrypted: &str) -> Result<Vec<u8>, SopsDecryptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.plaintext.clone())
    }
}

/// Deterministic per-payload plaintext: `<file>:<payload reversed>`
#[derive(Debug, Default)]
pub struct EchoDecryptor;

impl EchoDecryptor {
    pub fn expected(file_name: &str, encrypted: &str) -> Vec<u8> {
        format!("{file_name}:{}", encrypted.chars().rev().collect::<String>()).into_bytes()
    }
}

#[async_trait::async_trait]
impl Decryptor for EchoDecryptor {
    async fn decrypt(&self, file_name: &str, encrypted: &str) -> Result<Vec<u8>, SopsDecryptionError> {
        Ok(Self::expected(file_name, encrypted))
    }
}

/// Fails for one file name (or every file when `fail_on` is `None`)
#[derive(Debug, Default)]
pub struct FailingDecryptor {
    pub fail_on: Option<String>,
}

impl FailingDecryptor {
    pub fn always() -> Arc<Self> {
        Arc::new(Self { fail_on: None })
    }

    pub fn on(file_name: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(file_name.to_string()),
        })
    }
}

#[async_trait::async_trait]
impl Decryptor for FailingDecryptor {
    async fn decrypt(&self, file_name: &str, _encrypted: &str) -> Result<Vec<u8>, SopsDecryptionError> {
        match &self.fail_on {
            Some(target) if target != file_name => Ok(b"unencrypted".to_vec()),
            _ => Err(SopsDecryptionError::new(
                SopsDecryptionFailureReason::KeyNotFound,
                "failed to decrypt file: Error getting data key: 0 successful groups required, got 0",
            )),
        }
    }
}

/// Records events as `"<type> <reason> <message>"`
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<String>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, _resource: &SopsSecret, type_: EventType, reason: &str, message: &str) {
        let type_ = match type_ {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        };
        self.events
            .lock()
            .unwrap()
            .push(format!("{type_} {reason} {message}"));
    }
}

/// A persisted `SopsSecret` with a uid and the given encrypted files
pub fn sops_secret(name: &str, files: &[(&str, &str)]) -> SopsSecret {
    let spec = SopsSecretSpec {
        string_data: files
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        ..SopsSecretSpec::default()
    };
    let mut resource = SopsSecret::new(name, spec);
    resource.metadata.namespace = Some(NAMESPACE.to_string());
    resource.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
    resource.metadata.creation_timestamp = Some(creation_timestamp());
    resource
}

/// A Secret nobody controls
pub fn foreign_secret(name: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([("owner".to_string(), "someone-else".to_string())])),
            ..ObjectMeta::default()
        },
        string_data: Some(BTreeMap::from([("key".to_string(), "value".to_string())])),
        ..Secret::default()
    }
}

pub fn reconciler(
    store: &Arc<InMemoryStore>,
    decryptor: Arc<dyn Decryptor>,
    events: &Arc<RecordingEventPublisher>,
) -> Reconciler {
    Reconciler::new(
        Arc::clone(store) as Arc<dyn ResourceStore>,
        decryptor,
        Arc::clone(events) as Arc<dyn EventPublisher>,
    )
    .with_clock(fixed_now)
}
