//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

use std::time::Duration;

/// Name used as event reporter, field manager, and in ownership conflict messages
pub const OPERATOR_NAME: &str = "sops-operator";

/// Controller name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "sopssecret-controller";

/// Default bind address for the metrics and health probe server
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default requeue interval when the `SopsSecret` itself cannot be loaded (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default maximum number of concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default name of the Lease used for leader election
pub const DEFAULT_LEADER_ELECTION_ID: &str = "sops-operator-lock";

/// How long standby replicas wait before taking over a Lease that is not renewed
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);

/// How long the leader keeps retrying renewal before giving up leadership
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);

/// Interval between leader election attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Default sops binary (resolved through `PATH` unless absolute)
pub const DEFAULT_SOPS_BINARY: &str = "sops";

/// Default timeout for a single sops invocation (seconds)
pub const DEFAULT_SOPS_DECRYPT_TIMEOUT_SECS: u64 = 30;

/// Base retry interval for the first failure after a success (or no status at all)
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Upper bound for the failure backoff
pub const BACKOFF_CAP: Duration = Duration::from_secs(6 * 60 * 60);

/// Requeue delay after a failed status write, independent of the backoff
pub const STATUS_WRITE_RETRY: Duration = Duration::from_secs(1);

/// Attempts made to apply a Secret when the API server reports a write conflict
pub const APPLY_CONFLICT_RETRIES: usize = 3;

/// Event reason used for every failure notification
pub const EVENT_REASON_PROCESSING_ERROR: &str = "ProcessingError";

/// Event action recorded on every notification
pub const EVENT_ACTION_RECONCILE: &str = "Reconcile";

/// Initial delay before restarting a watch after the API server throttles (429)
pub const WATCH_BACKOFF_START_MS: u64 = 1_000;

/// Maximum delay before restarting a throttled watch
pub const WATCH_BACKOFF_MAX_MS: u64 = 30_000;
