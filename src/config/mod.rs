//! # Configuration
//!
//! Operator configuration loaded from environment variables and command-line flags.
//!
//! - `controller`: controller-level settings (namespaces, concurrency, sops, logging)

mod controller;

pub use controller::{parse_duration, parse_namespaces, ControllerConfig, LogFormat};
