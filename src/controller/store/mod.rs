//! # Resource Store
//!
//! Object store addressed by `(namespace, name)` that the reconciler reads
//! `SopsSecret`s from and writes `Secret`s and statuses to.
//!
//! - `kubernetes`: API-server backed implementation

mod kubernetes;

pub use kubernetes::KubeResourceStore;

use crate::crd::{SopsSecret, SopsSecretStatus};
use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict (stale `resourceVersion` or object already exists)
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Kube(kube::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 409 => {
                StoreError::Conflict(api_err.message)
            }
            other => StoreError::Kube(other),
        }
    }
}

/// Storage operations the reconciler depends on
///
/// `get_*` return `Ok(None)` for absent objects. `replace_secret` must carry
/// the caller's `resourceVersion` and fail with [`StoreError::Conflict`] when
/// it is stale.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_sops_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SopsSecret>, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Overwrite the status subresource of `sops_secret`
    async fn update_sops_secret_status(
        &self,
        sops_secret: &SopsSecret,
        status: &SopsSecretStatus,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code,
        })
    }

    #[test]
    fn test_conflict_maps_from_409() {
        let err = StoreError::from(api_error(409));
        assert!(err.is_conflict());
        assert!(err.to_string().contains("the object has been modified"));
    }

    #[test]
    fn test_other_api_errors_stay_kube() {
        let err = StoreError::from(api_error(500));
        assert!(!err.is_conflict());
        assert!(matches!(err, StoreError::Kube(_)));
    }
}
