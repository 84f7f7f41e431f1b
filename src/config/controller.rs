//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<number>\d+)(?P<unit>ms|s|m|h)$").expect("duration regex is valid")
});

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "text" | "console" => Some(LogFormat::Text),
            _ => None,
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Command-line flags parsed in `main` take precedence over the environment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespaces to watch. Empty means all namespaces.
    /// Populated from `WATCH_NAMESPACE` (single namespace or comma-separated list)
    pub watch_namespaces: Vec<String>,
    /// Bind address for `/metrics`, `/healthz` and `/readyz`
    pub metrics_addr: String,
    /// HTTP server startup timeout (seconds)
    pub server_startup_timeout_secs: u64,
    /// HTTP server readiness poll interval (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Maximum concurrent reconciliations
    /// Different keys reconcile in parallel up to this bound
    pub max_concurrent_reconciliations: u16,
    /// Requeue interval when the `SopsSecret` cannot be loaded (seconds)
    pub reconciliation_error_requeue_secs: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// sops binary name or absolute path
    pub sops_binary: String,
    /// Timeout for a single sops invocation (seconds)
    pub sops_decrypt_timeout_secs: u64,
    /// Pass `--aws-endpoint https://kms-fips.<region>.amazonaws.com` to sops,
    /// with the region taken from the KMS ARN in the payload
    pub sops_kms_fips_endpoint: bool,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Only the replica holding the leader Lease reconciles
    pub leader_election: bool,
    /// Name of the leader election Lease
    pub leader_election_id: String,
    /// Namespace of the leader election Lease. Empty means the operator's own namespace.
    pub leader_election_namespace: String,
    /// How long standby replicas wait before taking over an unrenewed Lease
    pub lease_duration: Duration,
    /// How long the leader retries renewal before giving up leadership
    pub renew_deadline: Duration,
    /// Interval between leader election attempts
    pub retry_period: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            watch_namespaces: Vec::new(),
            metrics_addr: DEFAULT_METRICS_ADDR.to_string(),
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            sops_binary: DEFAULT_SOPS_BINARY.to_string(),
            sops_decrypt_timeout_secs: DEFAULT_SOPS_DECRYPT_TIMEOUT_SECS,
            sops_kms_fips_endpoint: false,
            log_format: LogFormat::Json,
            leader_election: true,
            leader_election_id: DEFAULT_LEADER_ELECTION_ID.to_string(),
            leader_election_namespace: String::new(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            watch_namespaces: parse_namespaces(&env_var_or_default_str("WATCH_NAMESPACE", "")),
            metrics_addr: env_var_or_default_str("METRICS_ADDR", DEFAULT_METRICS_ADDR),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            reconciliation_error_requeue_secs: env_var_or_default(
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            sops_binary: env_var_or_default_str("SOPS_BINARY", DEFAULT_SOPS_BINARY),
            sops_decrypt_timeout_secs: env_var_or_default(
                "SOPS_DECRYPT_TIMEOUT_SECS",
                DEFAULT_SOPS_DECRYPT_TIMEOUT_SECS,
            ),
            sops_kms_fips_endpoint: env_var_or_default_bool("SOPS_KMS_FIPS_ENDPOINT", false),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "json"))
                .unwrap_or(LogFormat::Json),
            leader_election: env_var_or_default_bool("LEADER_ELECTION", true),
            leader_election_id: env_var_or_default_str(
                "LEADER_ELECTION_ID",
                DEFAULT_LEADER_ELECTION_ID,
            ),
            leader_election_namespace: env_var_or_default_str("LEADER_ELECTION_NAMESPACE", ""),
            lease_duration: env_var_or_default_duration("LEASE_DURATION", DEFAULT_LEASE_DURATION),
            renew_deadline: env_var_or_default_duration("RENEW_DEADLINE", DEFAULT_RENEW_DEADLINE),
            retry_period: env_var_or_default_duration("RETRY_PERIOD", DEFAULT_RETRY_PERIOD),
        }
    }

    /// Check settings that depend on each other
    ///
    /// # Errors
    ///
    /// Fails when the leader election timings cannot work together:
    /// `retry_period` must be shorter than `renew_deadline`, which must be
    /// shorter than `lease_duration`.
    pub fn validate(&self) -> Result<()> {
        if !self.leader_election {
            return Ok(());
        }
        if self.leader_election_id.trim().is_empty() {
            return Err(anyhow::anyhow!("leader election id cannot be empty"));
        }
        if self.renew_deadline >= self.lease_duration {
            return Err(anyhow::anyhow!(
                "renew deadline ({:?}) must be shorter than lease duration ({:?})",
                self.renew_deadline,
                self.lease_duration
            ));
        }
        if self.retry_period.is_zero() || self.retry_period >= self.renew_deadline {
            return Err(anyhow::anyhow!(
                "retry period ({:?}) must be non-zero and shorter than renew deadline ({:?})",
                self.retry_period,
                self.renew_deadline
            ));
        }
        Ok(())
    }

    /// Get reconciliation error requeue duration
    #[must_use]
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get sops decrypt timeout duration
    #[must_use]
    pub fn sops_decrypt_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.sops_decrypt_timeout_secs)
    }

    /// Get server startup timeout duration
    #[must_use]
    pub fn server_startup_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.server_startup_timeout_secs)
    }

    /// Get server readiness poll interval
    #[must_use]
    pub fn server_poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.server_poll_interval_ms)
    }
}

/// Split a `WATCH_NAMESPACE` value into namespaces
///
/// Accepts a single namespace or a comma-separated list; blanks are dropped,
/// so an empty value means "all namespaces".
#[must_use]
pub fn parse_namespaces(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse a duration flag such as `15s`, `500ms`, `1m` or `1h`
///
/// # Errors
///
/// Fails on anything that is not `<number><unit>` with unit ms, s, m or h.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let captures = DURATION_REGEX.captures(trimmed).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid duration format '{trimmed}'. Expected format: <number><unit> (e.g., '500ms', '15s', '1m')"
        )
    })?;
    let number: u64 = captures["number"]
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid duration number in '{trimmed}': {e}"))?;

    let duration = match &captures["unit"] {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => Duration::from_secs(number.saturating_mul(60)),
        _ => Duration::from_secs(number.saturating_mul(3600)),
    };
    Ok(duration)
}

/// Read environment variable as duration or return default
fn env_var_or_default_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_duration(&v).ok())
        .unwrap_or(default)
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
