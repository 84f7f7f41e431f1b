//! # SOPS Operator
//!
//! A Kubernetes operator that decrypts SOPS-encrypted `SopsSecret` resources
//! into Kubernetes `Secret`s.
//!
//! ## Overview
//!
//! For every `SopsSecret` the operator:
//!
//! 1. **Decrypts** each `stringData` entry with the `sops` binary
//! 2. **Creates or updates** a `Secret` with the same name, owned by the `SopsSecret`
//! 3. **Records** `Success`/`Failure` in the status and emits Kubernetes Events
//! 4. **Backs off** exponentially (capped at 6h) while a resource keeps failing
//!
//! ## Usage
//!
//! ```text
//! sops-operator --metrics-addr 0.0.0.0:8080 --watch-namespace team-a,team-b
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use sops_operator::config::{parse_duration, parse_namespaces, ControllerConfig, LogFormat};
use std::time::Duration;
use sops_operator::runtime::{initialize, run_watch_loop};

/// Decrypts SopsSecret resources into Kubernetes Secrets
#[derive(Debug, Parser)]
#[command(name = "sops-operator", version, about, long_about = None)]
struct Args {
    /// Address the metrics and health probe endpoints bind to
    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<String>,

    /// Namespace (or comma-separated namespaces) to watch; all when unset
    #[arg(long, value_name = "NAMESPACES")]
    watch_namespace: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Maximum number of SopsSecrets reconciled concurrently
    #[arg(long, value_name = "N")]
    max_concurrent_reconciliations: Option<u16>,

    /// Enable leader election
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    leader_election: Option<bool>,

    /// Name of the Lease holding the leader lock
    #[arg(long, value_name = "NAME")]
    leader_election_id: Option<String>,

    /// Namespace of the leader Lease; the operator's own namespace when unset
    #[arg(long, value_name = "NAMESPACE")]
    leader_election_namespace: Option<String>,

    /// How long standby replicas wait before forcing leadership
    #[arg(long, value_name = "DURATION", value_parser = duration_arg)]
    lease_duration: Option<Duration>,

    /// How long the leader retries refreshing leadership before giving up
    #[arg(long, value_name = "DURATION", value_parser = duration_arg)]
    renew_deadline: Option<Duration>,

    /// How long to wait between leader election attempts
    #[arg(long = "retry-duration", value_name = "DURATION", value_parser = duration_arg)]
    retry_period: Option<Duration>,
}

impl Args {
    /// Flags override values loaded from the environment
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(addr) = self.metrics_addr {
            config.metrics_addr = normalize_addr(&addr);
        }
        if let Some(namespaces) = self.watch_namespace {
            config.watch_namespaces = parse_namespaces(&namespaces);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(max) = self.max_concurrent_reconciliations {
            config.max_concurrent_reconciliations = max;
        }
        if let Some(enabled) = self.leader_election {
            config.leader_election = enabled;
        }
        if let Some(id) = self.leader_election_id {
            config.leader_election_id = id;
        }
        if let Some(namespace) = self.leader_election_namespace {
            config.leader_election_namespace = namespace;
        }
        if let Some(duration) = self.lease_duration {
            config.lease_duration = duration;
        }
        if let Some(deadline) = self.renew_deadline {
            config.renew_deadline = deadline;
        }
        if let Some(period) = self.retry_period {
            config.retry_period = period;
        }
        config
    }
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

/// Accept port-only `:8080` addresses
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().apply(ControllerConfig::from_env());
    config.validate().context("Invalid configuration")?;

    let init = initialize(config)
        .await
        .context("Failed to initialize operator")?;

    run_watch_loop(init.client, init.reconciler, init.server_state, init.config)
        .await
        .context("Watch loop failed")
}
