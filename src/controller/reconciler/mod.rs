//! # Reconciler
//!
//! Core reconciliation logic for `SopsSecret` resources.
//!
//! The reconciler:
//! - Loads the `SopsSecret` for the requested key
//! - Refuses to touch a same-named `Secret` it does not control
//! - Decrypts every `stringData` entry with sops (all or nothing)
//! - Creates or updates the `Secret`, skipping identical content
//! - Records `Success`/`Failure` in the status and backs off on failure
//!
//! ## Reconciliation Flow
//!
//! 1. Get the `SopsSecret` (absent: nothing to do)
//! 2. Get the existing `Secret` and check its controller reference
//! 3. Decrypt payloads
//! 4. Build the desired `Secret` and apply it (retrying write conflicts)
//! 5. Update status, publish an event, compute the requeue

pub mod reconcile;
pub mod secret;
pub mod status;
pub mod types;

// Re-export public API
pub use reconcile::apply_secret;
pub use secret::{build_secret, check_ownership, is_owned_by, ControllerRef};
pub use status::{capitalize_first, compute_next_delay, manage_error, manage_success, StatusSnapshot};
pub use types::{
    Clock, OperationResult, ReconcileResult, Reconciler, ReconcilerError, RequestScope,
};
