//! # SOPS Decryption Error Types
//!
//! Error types for SOPS decryption with classification of transient vs permanent failures.

use thiserror::Error;

/// SOPS decryption error with classification
///
/// Displays only the message, which ends up verbatim in the `SopsSecret`
/// status reason and the warning event.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SopsDecryptionError {
    pub reason: SopsDecryptionFailureReason,
    pub message: String,
}

impl SopsDecryptionError {
    pub fn new(reason: SopsDecryptionFailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reason.is_transient()
    }

    /// Get remediation guidance for this error
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        self.reason.remediation()
    }
}

/// Classification of SOPS decryption failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SopsDecryptionFailureReason {
    /// No usable decryption key (permanent - configuration error)
    KeyNotFound,
    /// Wrong key for this payload (permanent - configuration error)
    WrongKey,
    /// Payload does not match the format inferred from its file name (permanent)
    UnsupportedFormat,
    /// Payload is not valid sops output (permanent - file issue)
    CorruptedFile,
    /// KMS region could not be derived from the payload (permanent)
    RegionNotFound,
    /// Timed out contacting the key provider or waiting for sops (transient)
    NetworkTimeout,
    /// sops binary or key provider unavailable (transient)
    ProviderUnavailable,
    /// KMS/IAM permission denied (may be transient while policies propagate)
    PermissionDenied,
    /// Unknown error (assume transient)
    Unknown,
}

impl SopsDecryptionFailureReason {
    /// Determine if this error is transient (should retry) or permanent
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SopsDecryptionFailureReason::NetworkTimeout
                | SopsDecryptionFailureReason::ProviderUnavailable
                | SopsDecryptionFailureReason::PermissionDenied
                | SopsDecryptionFailureReason::Unknown
        )
    }

    /// Reason label for metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SopsDecryptionFailureReason::KeyNotFound => "key_not_found",
            SopsDecryptionFailureReason::WrongKey => "wrong_key",
            SopsDecryptionFailureReason::UnsupportedFormat => "unsupported_format",
            SopsDecryptionFailureReason::CorruptedFile => "corrupted_file",
            SopsDecryptionFailureReason::RegionNotFound => "region_not_found",
            SopsDecryptionFailureReason::NetworkTimeout => "network_timeout",
            SopsDecryptionFailureReason::ProviderUnavailable => "provider_unavailable",
            SopsDecryptionFailureReason::PermissionDenied => "permission_denied",
            SopsDecryptionFailureReason::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            SopsDecryptionFailureReason::KeyNotFound => {
                "No key able to decrypt the payload is available to the operator. Grant the operator's identity access to the KMS key listed in the sops metadata."
            }
            SopsDecryptionFailureReason::WrongKey => {
                "The available key does not match the key the payload was encrypted with. Re-encrypt the payload with the operator's key."
            }
            SopsDecryptionFailureReason::UnsupportedFormat => {
                "The payload does not match the format implied by its file name. Use .yaml/.yml, .json, .ini or .env, or a key without extension for binary payloads."
            }
            SopsDecryptionFailureReason::CorruptedFile => {
                "The payload is not a valid sops document. Verify it was encrypted with sops and has not been modified."
            }
            SopsDecryptionFailureReason::RegionNotFound => {
                "FIPS endpoints are enabled but the payload carries no arn:aws:kms:<region>: key ARN."
            }
            SopsDecryptionFailureReason::NetworkTimeout => {
                "Timed out contacting the key provider. This is usually transient - will retry."
            }
            SopsDecryptionFailureReason::ProviderUnavailable => {
                "sops or the key provider is unavailable. Check that the sops binary is installed and the provider is reachable."
            }
            SopsDecryptionFailureReason::PermissionDenied => {
                "Access to the key was denied. Verify the KMS key policy and the operator's IAM role."
            }
            SopsDecryptionFailureReason::Unknown => {
                "Unknown sops error. Check controller logs for the full sops output."
            }
        }
    }
}

/// Classify a sops failure from its stderr and exit code
///
/// Exit codes (sops `cmd/sops/codes`): 3 unreadable file, 100 could not
/// retrieve key, 128 no matching creation rule / metadata not found,
/// 203 MAC mismatch.
#[must_use]
pub fn classify_sops_error(error_msg: &str, exit_code: Option<i32>) -> SopsDecryptionFailureReason {
    match exit_code {
        Some(100) => return SopsDecryptionFailureReason::KeyNotFound,
        Some(203) => return SopsDecryptionFailureReason::CorruptedFile,
        Some(128) => return SopsDecryptionFailureReason::UnsupportedFormat,
        _ => {}
    }

    let error_lower = error_msg.to_lowercase();

    if error_lower.contains("accessdenied")
        || error_lower.contains("access denied")
        || error_lower.contains("permission denied")
        || error_lower.contains("unauthorized")
        || error_lower.contains("forbidden")
    {
        return SopsDecryptionFailureReason::PermissionDenied;
    }

    if error_lower.contains("timeout") || error_lower.contains("timed out") {
        return SopsDecryptionFailureReason::NetworkTimeout;
    }

    if error_lower.contains("no decryption key")
        || error_lower.contains("key not found")
        || error_lower.contains("failed to get the data key")
    {
        return SopsDecryptionFailureReason::KeyNotFound;
    }

    if error_lower.contains("wrong key") {
        return SopsDecryptionFailureReason::WrongKey;
    }

    if error_lower.contains("error unmarshalling input")
        || error_lower.contains("unsupported format")
        || error_lower.contains("sops metadata not found")
    {
        return SopsDecryptionFailureReason::UnsupportedFormat;
    }

    if error_lower.contains("mac mismatch") || error_lower.contains("corrupt") {
        return SopsDecryptionFailureReason::CorruptedFile;
    }

    if error_lower.contains("unavailable")
        || error_lower.contains("connection refused")
        || error_lower.contains("no such host")
    {
        return SopsDecryptionFailureReason::ProviderUnavailable;
    }

    SopsDecryptionFailureReason::Unknown
}
