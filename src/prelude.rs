//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use sops_operator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - CRD types (`SopsSecret`, `SopsSecretStatus`, ...)
//! - Collaborator traits (`Decryptor`, `ResourceStore`, `EventPublisher`)
//! - Reconciler types (`Reconciler`, `ReconcilerError`, ...)
//! - Config types (`ControllerConfig`)

// CRD types - most commonly used
pub use crate::crd::*;

// Collaborator traits - needed for alternative implementations and test doubles
pub use crate::controller::events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use crate::controller::sops::{
    Decryptor, FileFormat, SopsBinaryDecryptor, SopsDecryptionError, SopsDecryptionFailureReason,
};
pub use crate::controller::store::{KubeResourceStore, ResourceStore, StoreError};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    OperationResult, ReconcileResult, Reconciler, ReconcilerError, StatusSnapshot,
};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, LogFormat};
