//! # Kubernetes Resource Store
//!
//! `ResourceStore` backed by the API server.

use crate::constants::OPERATOR_NAME;
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::{SopsSecret, SopsSecretStatus};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
}

impl std::fmt::Debug for KubeResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceStore").finish_non_exhaustive()
    }
}

impl KubeResourceStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn sops_secrets(&self, namespace: &str) -> Api<SopsSecret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

fn namespace_of(secret: &Secret) -> Result<String, StoreError> {
    secret
        .namespace()
        .ok_or_else(|| StoreError::Backend(format!("secret {} has no namespace", secret.name_any())))
}

#[async_trait::async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_sops_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SopsSecret>, StoreError> {
        Ok(self.sops_secrets(namespace).get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.secrets(namespace).get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = namespace_of(secret)?;
        Ok(self
            .secrets(&namespace)
            .create(&Self::post_params(), secret)
            .await?)
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = namespace_of(secret)?;
        Ok(self
            .secrets(&namespace)
            .replace(&secret.name_any(), &Self::post_params(), secret)
            .await?)
    }

    async fn update_sops_secret_status(
        &self,
        sops_secret: &SopsSecret,
        status: &SopsSecretStatus,
    ) -> Result<(), StoreError> {
        let namespace = sops_secret.namespace().ok_or_else(|| {
            StoreError::Backend(format!("SopsSecret {} has no namespace", sops_secret.name_any()))
        })?;
        let name = sops_secret.name_any();

        // resourceVersion turns the merge patch into a compare-and-swap.
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": sops_secret.resource_version() },
            "status": status,
        });

        self.sops_secrets(&namespace)
            .patch_status(&name, &PatchParams::apply(OPERATOR_NAME), &Patch::Merge(patch))
            .await?;

        debug!(
            "Updated status for SopsSecret {}/{}: {}",
            namespace,
            name,
            status.status_value.as_str()
        );
        Ok(())
    }
}
