//! # SOPS
//!
//! Decryption of `stringData` payloads.
//!
//! - `decrypt`: `sops` CLI decryptor
//! - `error`: decryption errors and failure classification
//! - `format`: file name to sops format mapping

mod decrypt;
mod error;
mod format;

pub use decrypt::{kms_region, SopsBinaryDecryptor};
pub use error::{classify_sops_error, SopsDecryptionError, SopsDecryptionFailureReason};
pub use format::FileFormat;

/// Turns one encrypted payload into plaintext bytes
///
/// The file name only selects the format; implementations must not touch disk.
#[async_trait::async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(&self, file_name: &str, encrypted: &str) -> Result<Vec<u8>, SopsDecryptionError>;
}
