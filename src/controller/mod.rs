//! # Controller
//!
//! Core controller modules for the SOPS operator.
//!
//! - `events`: Kubernetes Event publishing
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks
//! - `sops`: Payload decryption through the sops binary
//! - `store`: Reads and writes of `SopsSecret`s and `Secret`s

pub mod events;
pub mod reconciler;
pub mod server;
pub mod sops;
pub mod store;
