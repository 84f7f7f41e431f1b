//! # Runtime
//!
//! Operator runtime: startup, the controller watch loop, and error policies.
//!
//! - `initialization`: tracing, metrics, HTTP server, client and reconciler setup
//! - `watch_loop`: `kube_runtime::Controller` per watched namespace
//! - `error_policy`: requeue for load failures, watch stream error handling
//! - `leader_election`: Lease-based leader election gating the watch loop

pub mod error_policy;
pub mod initialization;
pub mod leader_election;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;
