//! # SopsSecret Status
//!
//! Observed state written by the reconciler after every completed attempt.
//! Retry backoff is reconstructed from these fields, so their encoding is
//! part of the operator's persisted contract.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the last completed reconciliation attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum StatusValue {
    /// No attempt has completed yet
    #[default]
    #[serde(rename = "")]
    Unknown,
    Success,
    Failure,
}

impl StatusValue {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusValue::Unknown => "",
            StatusValue::Success => "Success",
            StatusValue::Failure => "Failure",
        }
    }
}

/// Status of the SopsSecret resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SopsSecretStatus {
    /// Time of the last status transition (RFC3339, second precision)
    #[serde(default, alias = "lastUpdateTime")]
    pub last_update: Option<String>,
    /// Error message of the last failure, empty on success
    #[serde(default)]
    pub reason: String,
    /// Success or Failure; empty until the first attempt completes
    #[serde(default, rename = "status", alias = "statusValue")]
    pub status_value: StatusValue,
}

impl SopsSecretStatus {
    /// Status recorded after a successful apply
    #[must_use]
    pub fn success(now: DateTime<Utc>) -> Self {
        Self {
            last_update: Some(format_timestamp(now)),
            reason: String::new(),
            status_value: StatusValue::Success,
        }
    }

    /// Status recorded after a failed attempt
    #[must_use]
    pub fn failure(now: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            last_update: Some(format_timestamp(now)),
            reason: reason.into(),
            status_value: StatusValue::Failure,
        }
    }

    /// Parsed `lastUpdate`, `None` when absent or unparseable
    #[must_use]
    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_update
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Format a timestamp the way the API server serializes `metav1.Time`
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_value_wire_format() {
        assert_eq!(
            serde_json::to_string(&StatusValue::Unknown).unwrap(),
            "\"\""
        );
        assert_eq!(
            serde_json::to_string(&StatusValue::Failure).unwrap(),
            "\"Failure\""
        );
        let parsed: StatusValue = serde_json::from_str("\"Success\"").unwrap();
        assert_eq!(parsed, StatusValue::Success);
    }

    #[test]
    fn test_status_serializes_wire_field_names() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap();
        let status = SopsSecretStatus::failure(now, "boom");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["lastUpdate"], "2024-05-01T12:30:45Z");
        assert_eq!(json["reason"], "boom");
        assert_eq!(json["status"], "Failure");
    }

    #[test]
    fn test_status_accepts_logical_aliases() {
        let status: SopsSecretStatus = serde_json::from_value(serde_json::json!({
            "lastUpdateTime": "2024-05-01T12:30:45Z",
            "statusValue": "Success"
        }))
        .unwrap();
        assert_eq!(status.status_value, StatusValue::Success);
        assert!(status.reason.is_empty());
        assert_eq!(
            status.last_update_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap())
        );
    }

    #[test]
    fn test_timestamp_drops_subseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 987_000_000).unwrap();
        assert_eq!(format_timestamp(ts), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_last_update_time_invalid() {
        let status = SopsSecretStatus {
            last_update: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert_eq!(status.last_update_time(), None);
    }
}
