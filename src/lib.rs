//! SOPS Operator Library
//!
//! Reconciles `SopsSecret` custom resources into decrypted Kubernetes
//! `Secret`s. Unit tests live in the module files; integration tests drive
//! the reconciler through in-memory test doubles under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use sops_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
