//! # Custom Resource Definitions
//!
//! CRD types for the SOPS operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `SopsSecret` specification and generated-Secret metadata
//! - `status.rs` - Status types written by the reconciler

mod spec;
mod status;

// Re-export all public types
pub use spec::{SopsSecret, SopsSecretObjectMeta, SopsSecretSpec};
pub use status::{format_timestamp, SopsSecretStatus, StatusValue};
