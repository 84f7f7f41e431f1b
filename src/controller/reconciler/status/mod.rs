//! # Status Management
//!
//! Updates `SopsSecret` status with reconciliation results and derives the
//! retry backoff from it.

mod backoff;
mod status;

pub use backoff::{capitalize_first, compute_next_delay, StatusSnapshot};
pub use status::{manage_error, manage_success};
