//! # Backoff Calculation
//!
//! Derives the retry delay after a failure from the status the failure is
//! about to overwrite. No retry state lives in the process, so a restart
//! resumes the same backoff sequence.

use crate::constants::{BACKOFF_BASE, BACKOFF_CAP};
use crate::crd::{SopsSecret, StatusValue};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Status of a `SopsSecret` before the current attempt overwrote it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub previous_status: StatusValue,
    pub previous_update: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn of(sops_secret: &SopsSecret) -> Self {
        sops_secret
            .status
            .as_ref()
            .map(|status| Self {
                previous_status: status.status_value,
                previous_update: status.last_update_time(),
            })
            .unwrap_or_default()
    }
}

/// Delay before retrying a failed reconciliation
///
/// The first failure after a success, or with no prior status, retries after
/// exactly [`BACKOFF_BASE`]. A repeated failure doubles the time elapsed since
/// the previous failure (rounded to whole seconds) up to [`BACKOFF_CAP`].
#[must_use]
pub fn compute_next_delay(snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Duration {
    let Some(previous_update) = snapshot.previous_update else {
        return BACKOFF_BASE;
    };
    if snapshot.previous_status == StatusValue::Success {
        return BACKOFF_BASE;
    }

    let elapsed_ms = (now - previous_update).num_milliseconds();
    let base = if elapsed_ms <= 0 {
        BACKOFF_BASE
    } else {
        #[allow(clippy::cast_sign_loss, reason = "elapsed_ms is positive here")]
        let secs = ((elapsed_ms + 500) / 1000) as u64;
        Duration::from_secs(secs).max(BACKOFF_BASE)
    };

    base.saturating_mul(2).min(BACKOFF_CAP)
}

/// Upper-case the first character, as used for event messages
#[must_use]
pub fn capitalize_first(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn failure_at(secs: i64) -> StatusSnapshot {
        StatusSnapshot {
            previous_status: StatusValue::Failure,
            previous_update: Some(at(secs)),
        }
    }

    #[test]
    fn test_first_failure_without_status() {
        assert_eq!(
            compute_next_delay(&StatusSnapshot::default(), at(0)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_first_failure_after_success() {
        let snapshot = StatusSnapshot {
            previous_status: StatusValue::Success,
            previous_update: Some(at(-3600)),
        };
        assert_eq!(compute_next_delay(&snapshot, at(0)), Duration::from_secs(1));
    }

    #[test]
    fn test_repeated_failure_doubles_elapsed() {
        assert_eq!(
            compute_next_delay(&failure_at(0), at(1)),
            Duration::from_secs(2)
        );
        assert_eq!(
            compute_next_delay(&failure_at(0), at(100)),
            Duration::from_secs(200)
        );
    }

    #[test]
    fn test_elapsed_rounds_to_nearest_second() {
        let now = Utc.timestamp_opt(1_700_000_010, 600_000_000).unwrap();
        assert_eq!(
            compute_next_delay(&failure_at(0), now),
            Duration::from_secs(22)
        );
        let now = Utc.timestamp_opt(1_700_000_010, 400_000_000).unwrap();
        assert_eq!(
            compute_next_delay(&failure_at(0), now),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn test_non_positive_elapsed_collapses_to_base() {
        assert_eq!(
            compute_next_delay(&failure_at(0), at(0)),
            Duration::from_secs(2)
        );
        assert_eq!(
            compute_next_delay(&failure_at(60), at(0)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_delay_is_capped_at_six_hours() {
        assert_eq!(
            compute_next_delay(&failure_at(0), at(4 * 3600)),
            Duration::from_secs(6 * 3600)
        );
        assert_eq!(
            compute_next_delay(&failure_at(0), at(365 * 24 * 3600)),
            Duration::from_secs(6 * 3600)
        );
    }

    #[test]
    fn test_consecutive_failures_stay_within_bound() {
        // Each retry fires exactly when requested.
        let mut now = at(0);
        let mut snapshot = StatusSnapshot::default();
        let mut previous = Duration::ZERO;
        for _ in 0..32 {
            let delay = compute_next_delay(&snapshot, now);
            assert!(delay <= (previous * 2).max(BACKOFF_CAP));
            assert!(delay <= BACKOFF_CAP);
            snapshot = StatusSnapshot {
                previous_status: StatusValue::Failure,
                previous_update: Some(now),
            };
            previous = delay;
            now += chrono::Duration::from_std(delay).unwrap();
        }
        assert_eq!(previous, BACKOFF_CAP);
    }

    #[test]
    fn test_capitalize_first() {
        assert_eq!(capitalize_first("failed to update"), "Failed to update");
        assert_eq!(capitalize_first(""), "");
        assert_eq!(capitalize_first("ärger"), "Ärger");
        assert_eq!(capitalize_first("Already"), "Already");
    }
}
