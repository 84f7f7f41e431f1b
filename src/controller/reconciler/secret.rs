//! # Secret Construction
//!
//! Builds the desired `Secret` for a `SopsSecret` and answers ownership questions.

use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::SopsSecret;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Controller reference compared by value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub is_controller: bool,
}

impl ControllerRef {
    /// Reference a Secret produced from `sops_secret` is expected to carry
    #[must_use]
    pub fn for_owner(sops_secret: &SopsSecret) -> Self {
        Self {
            kind: SopsSecret::kind(&()).to_string(),
            namespace: sops_secret.namespace().unwrap_or_default(),
            name: sops_secret.name_any(),
            is_controller: true,
        }
    }

    /// The controlling owner of `secret`, if any
    ///
    /// Owner references are namespace-local, so the owner's namespace is the
    /// Secret's own.
    #[must_use]
    pub fn controller_of(secret: &Secret) -> Option<Self> {
        secret
            .owner_references()
            .iter()
            .find(|owner| owner.controller == Some(true))
            .map(|owner| Self {
                kind: owner.kind.clone(),
                namespace: secret.namespace().unwrap_or_default(),
                name: owner.name.clone(),
                is_controller: true,
            })
    }
}

/// Whether `secret` is controlled by `sops_secret`
#[must_use]
pub fn is_owned_by(secret: &Secret, sops_secret: &SopsSecret) -> bool {
    ControllerRef::controller_of(secret).as_ref() == Some(&ControllerRef::for_owner(sops_secret))
}

/// Reject Secrets that already exist and belong to someone else
///
/// Only persisted objects (with a creation timestamp) are checked.
///
/// # Errors
///
/// [`ReconcilerError::Conflict`] when the Secret is not controlled by `sops_secret`.
pub fn check_ownership(existing: Option<&Secret>, sops_secret: &SopsSecret) -> Result<(), ReconcilerError> {
    match existing {
        Some(secret)
            if secret.metadata.creation_timestamp.is_some() && !is_owned_by(secret, sops_secret) =>
        {
            Err(ReconcilerError::Conflict)
        }
        _ => Ok(()),
    }
}

/// Build the desired Secret on top of the existing one
///
/// Data, labels and annotations are replaced wholesale. The type is only
/// overwritten when the `SopsSecret` sets one. Everything else on an
/// existing Secret (resourceVersion, foreign owner references) is kept.
///
/// # Errors
///
/// [`ReconcilerError::OwnerReference`] when `sops_secret` has no uid yet.
pub fn build_secret(
    sops_secret: &SopsSecret,
    existing: Option<&Secret>,
    data: BTreeMap<String, ByteString>,
) -> Result<Secret, ReconcilerError> {
    let owner = sops_secret
        .controller_owner_ref(&())
        .ok_or(ReconcilerError::OwnerReference)?;

    let mut secret = existing.cloned().unwrap_or_else(|| Secret {
        metadata: ObjectMeta {
            name: Some(sops_secret.name_any()),
            namespace: sops_secret.namespace(),
            ..ObjectMeta::default()
        },
        ..Secret::default()
    });

    let overrides = &sops_secret.spec.metadata;
    secret.data = non_empty(data);
    secret.metadata.labels = non_empty(overrides.labels.clone());
    secret.metadata.annotations = non_empty(overrides.annotations.clone());
    if !sops_secret.spec.secret_type.is_empty() {
        secret.type_ = Some(sops_secret.spec.secret_type.clone());
    }
    set_controller_reference(&mut secret.metadata, owner);

    Ok(secret)
}

/// Replace any reference to the same owner, keeping unrelated references
fn set_controller_reference(metadata: &mut ObjectMeta, owner: OwnerReference) {
    let mut refs = metadata.owner_references.take().unwrap_or_default();
    refs.retain(|existing| !(existing.kind == owner.kind && existing.name == owner.name));
    refs.push(owner);
    metadata.owner_references = Some(refs);
}

// The API server drops empty maps, so `Some(empty)` would never compare equal.
fn non_empty<V>(map: BTreeMap<String, V>) -> Option<BTreeMap<String, V>> {
    (!map.is_empty()).then_some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::SopsSecretSpec;

    fn sops_secret(name: &str) -> SopsSecret {
        let mut resource = SopsSecret::new(name, SopsSecretSpec::default());
        resource.metadata.namespace = Some("default".to_string());
        resource.metadata.uid = Some("0b7f3f0e-5f0e-4a4e-9c7a-1f6f0e6f3b11".to_string());
        resource
    }

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, ByteString> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
            .collect()
    }

    #[test]
    fn test_build_new_secret() {
        let mut resource = sops_secret("test-secret");
        resource.spec.secret_type = "Opaque".to_string();
        resource
            .spec
            .metadata
            .labels
            .insert("app".to_string(), "demo".to_string());

        let secret = build_secret(&resource, None, data(&[("a.yaml", "plain")])).unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some("test-secret"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            secret.data.unwrap()["a.yaml"],
            ByteString(b"plain".to_vec())
        );
        assert_eq!(secret.metadata.labels.unwrap()["app"], "demo");
        assert!(secret.metadata.annotations.is_none());
        assert!(is_owned_by(
            &Secret {
                metadata: ObjectMeta {
                    namespace: Some("default".to_string()),
                    owner_references: secret.metadata.owner_references,
                    ..ObjectMeta::default()
                },
                ..Secret::default()
            },
            &resource
        ));
    }

    #[test]
    fn test_build_keeps_existing_type_when_unset() {
        let resource = sops_secret("test-secret");
        let existing = Secret {
            metadata: ObjectMeta {
                name: Some("test-secret".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(BTreeMap::from([("old".to_string(), "label".to_string())])),
                ..ObjectMeta::default()
            },
            type_: Some("kubernetes.io/tls".to_string()),
            ..Secret::default()
        };

        let secret = build_secret(&resource, Some(&existing), data(&[])).unwrap();

        assert_eq!(secret.type_.as_deref(), Some("kubernetes.io/tls"));
        assert!(secret.metadata.labels.is_none());
        assert!(secret.data.is_none());
    }

    #[test]
    fn test_build_requires_uid() {
        let mut resource = sops_secret("test-secret");
        resource.metadata.uid = None;
        let err = build_secret(&resource, None, data(&[])).unwrap_err();
        assert!(matches!(err, ReconcilerError::OwnerReference));
    }

    #[test]
    fn test_owner_reference_refreshed_not_duplicated() {
        let resource = sops_secret("test-secret");
        let first = build_secret(&resource, None, data(&[])).unwrap();
        let second = build_secret(&resource, Some(&first), data(&[])).unwrap();
        assert_eq!(second.metadata.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn test_controller_ref_ignores_non_controller_owners() {
        let resource = sops_secret("test-secret");
        let mut owner = resource.controller_owner_ref(&()).unwrap();
        owner.controller = Some(false);
        let secret = Secret {
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                owner_references: Some(vec![owner]),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        assert_eq!(ControllerRef::controller_of(&secret), None);
        assert!(!is_owned_by(&secret, &resource));
    }

    #[test]
    fn test_check_ownership_skips_unpersisted_secret() {
        let resource = sops_secret("test-secret");
        let secret = Secret::default();
        assert!(check_ownership(Some(&secret), &resource).is_ok());
        assert!(check_ownership(None, &resource).is_ok());
    }
}
