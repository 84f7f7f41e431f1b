//! # SopsSecret Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SopsSecret Custom Resource Definition
///
/// Declares SOPS-encrypted payloads that the operator decrypts into a
/// Kubernetes `Secret` with the same name and namespace.
///
/// # Example
///
/// ```yaml
/// apiVersion: craftypath.github.io/v1alpha1
/// kind: SopsSecret
/// metadata:
///   name: my-app
///   namespace: default
/// spec:
///   type: Opaque
///   metadata:
///     labels:
///       app: my-app
///   stringData:
///     config.yaml: |
///       password: ENC[AES256_GCM,data:...]
///       sops:
///         kms:
///           - arn: arn:aws:kms:eu-central-1:123456789012:key/...
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "SopsSecret",
    group = "craftypath.github.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::SopsSecretStatus",
    shortname = "sops",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}, {"name":"Last Update", "type":"date", "jsonPath":".status.lastUpdate"}, {"name":"Reason", "type":"string", "priority":1, "jsonPath":".status.reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SopsSecretSpec {
    /// Labels and annotations stamped onto the generated Secret
    /// Replaces the Secret's labels and annotations wholesale on every reconcile
    #[serde(default, alias = "metadataOverrides")]
    pub metadata: SopsSecretObjectMeta,
    /// SOPS-encrypted secret data in string form, keyed by file name
    /// The file extension selects the sops input/output format
    #[serde(default)]
    pub string_data: BTreeMap<String, String>,
    /// Type of the generated Secret (e.g. `Opaque`, `kubernetes.io/tls`)
    /// When empty the Secret keeps its existing type
    #[serde(default, rename = "type", alias = "secretType", skip_serializing_if = "String::is_empty")]
    pub secret_type: String,
}

/// Metadata for generated Secrets
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SopsSecretObjectMeta {
    /// Annotations added to the generated Secret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Labels added to the generated Secret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}
