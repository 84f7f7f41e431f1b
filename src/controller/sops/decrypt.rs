//! # SOPS Decryption
//!
//! Decrypts payloads by piping them through the `sops` binary.
//!
//! Encrypted content goes to sops on stdin and plaintext is read back from
//! stdout. Neither is ever written to disk.

use crate::config::ControllerConfig;
use crate::controller::sops::error::{
    classify_sops_error, SopsDecryptionError, SopsDecryptionFailureReason,
};
use crate::controller::sops::format::FileFormat;
use crate::controller::sops::Decryptor;
use crate::observability::metrics;
use regex::Regex;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info_span, warn, Instrument};

static KMS_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"arn:aws:kms:([\w\d-]+):.*")
        .expect("Failed to compile KMS_REGION regex - this should never happen")
});

/// Longest stderr excerpt carried into status and events
const MAX_STDERR_LEN: usize = 500;

/// Decryptor backed by the `sops` CLI
#[derive(Debug, Clone)]
pub struct SopsBinaryDecryptor {
    binary: String,
    timeout: Duration,
    kms_fips_endpoint: bool,
}

impl SopsBinaryDecryptor {
    #[must_use]
    pub fn new(binary: impl Into<String>, timeout: Duration, kms_fips_endpoint: bool) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            kms_fips_endpoint,
        }
    }

    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.sops_binary.clone(),
            config.sops_decrypt_timeout_duration(),
            config.sops_kms_fips_endpoint,
        )
    }

    fn resolve_binary(&self) -> Result<PathBuf, SopsDecryptionError> {
        which::which(&self.binary).map_err(|e| {
            SopsDecryptionError::new(
                SopsDecryptionFailureReason::ProviderUnavailable,
                format!("sops binary '{}' not found: {e}", self.binary),
            )
        })
    }

    /// Build the sops argument list for a payload
    ///
    /// # Errors
    ///
    /// Fails when FIPS endpoints are enabled and the payload has no KMS ARN.
    pub fn build_args(
        &self,
        format: FileFormat,
        encrypted: &str,
    ) -> Result<Vec<String>, SopsDecryptionError> {
        let mut args = vec!["--decrypt".to_string()];
        if self.kms_fips_endpoint {
            let region = kms_region(encrypted)?;
            args.push("--aws-endpoint".to_string());
            args.push(format!("https://kms-fips.{region}.amazonaws.com"));
        }
        args.extend([
            "--input-type".to_string(),
            format.as_str().to_string(),
            "--output-type".to_string(),
            format.as_str().to_string(),
            "/dev/stdin".to_string(),
        ]);
        Ok(args)
    }

    async fn run(&self, args: Vec<String>, encrypted: &str) -> Result<Output, SopsDecryptionError> {
        let sops_path = self.resolve_binary()?;
        debug!("Using sops binary at: {:?}", sops_path);

        let mut child = tokio::process::Command::new(sops_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SopsDecryptionError::new(
                    SopsDecryptionFailureReason::ProviderUnavailable,
                    format!("failed to spawn sops: {e}"),
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(encrypted.as_bytes()).await.map_err(|e| {
                SopsDecryptionError::new(
                    SopsDecryptionFailureReason::Unknown,
                    format!("failed to write encrypted content to sops stdin: {e}"),
                )
            })?;
            stdin.shutdown().await.map_err(|e| {
                SopsDecryptionError::new(
                    SopsDecryptionFailureReason::Unknown,
                    format!("failed to close sops stdin: {e}"),
                )
            })?;
        }

        child.wait_with_output().await.map_err(|e| {
            SopsDecryptionError::new(
                SopsDecryptionFailureReason::Unknown,
                format!("failed to wait for sops: {e}"),
            )
        })
    }

    async fn decrypt_with_sops_binary(
        &self,
        file_name: &str,
        encrypted: &str,
    ) -> Result<Vec<u8>, SopsDecryptionError> {
        let format = FileFormat::from_file_name(file_name);
        let args = self.build_args(format, encrypted)?;
        debug!(file.name = file_name, file.format = %format, "decrypting data");

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.timeout, self.run(args, encrypted))
            .await
            .map_err(|_elapsed| {
                SopsDecryptionError::new(
                    SopsDecryptionFailureReason::NetworkTimeout,
                    format!(
                        "failed to decrypt file: sops timed out after {}s",
                        self.timeout.as_secs()
                    ),
                )
            })??;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code();
        warn!(exit_code = ?exit_code, "sops exited with failure: {}", stderr.trim());

        let reason = classify_sops_error(&stderr, exit_code);
        Err(SopsDecryptionError::new(
            reason,
            format!("failed to decrypt file: {}", truncate(stderr.trim())),
        ))
    }
}

#[async_trait::async_trait]
impl Decryptor for SopsBinaryDecryptor {
    async fn decrypt(&self, file_name: &str, encrypted: &str) -> Result<Vec<u8>, SopsDecryptionError> {
        let span = info_span!(
            "sops.decrypt",
            file.name = file_name,
            file.size = encrypted.len(),
            operation.success = tracing::field::Empty,
            error.reason = tracing::field::Empty,
        );
        let span_clone = span.clone();
        let start = Instant::now();

        async move {
            let result = self.decrypt_with_sops_binary(file_name, encrypted).await;

            metrics::increment_decryption_total();
            metrics::observe_decryption_duration(start.elapsed().as_secs_f64());

            match &result {
                Ok(_) => {
                    span_clone.record("operation.success", true);
                }
                Err(e) => {
                    span_clone.record("operation.success", false);
                    span_clone.record("error.reason", e.reason.as_str());
                    metrics::increment_decryption_errors(e.reason.as_str());

                    if e.is_transient() {
                        warn!("SOPS decryption failed (transient): {} - {}", e.reason.as_str(), e);
                    } else {
                        error!("SOPS decryption failed (permanent): {} - {}", e.reason.as_str(), e);
                        error!("Remediation: {}", e.remediation());
                    }
                }
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Extract the AWS region from the first KMS key ARN in the payload
///
/// # Errors
///
/// Fails when the payload contains no `arn:aws:kms:<region>:` ARN.
pub fn kms_region(encrypted: &str) -> Result<String, SopsDecryptionError> {
    KMS_REGION
        .captures(encrypted)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            SopsDecryptionError::new(
                SopsDecryptionFailureReason::RegionNotFound,
                "failed to detect region from encrypted string, got matches []",
            )
        })
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_STDERR_LEN {
        return message.to_string();
    }
    let mut end = MAX_STDERR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, see logs for full error)", &message[..end])
}
