use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one completed redemption attempt
///
/// Closed set of outcomes handed to the caller for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The code id is not present in the store
    NotFound,

    /// The code had been redeemed before, at the given time
    AlreadyRedeemed(DateTime<Utc>),

    /// This scan redeemed the code
    FirstRedemption(DateTime<Utc>),

    /// The payload is not one of our code urls; carries the raw payload
    ExternalPayload(String),

    /// The store could not be reached or failed; redemption state is unchanged
    Failure(String),
}

impl ScanOutcome {
    /// Redemption timestamp, when the code is known to be redeemed
    pub fn redeemed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ScanOutcome::AlreadyRedeemed(at) | ScanOutcome::FirstRedemption(at) => Some(*at),
            _ => None,
        }
    }

    pub fn is_first_redemption(&self) -> bool {
        matches!(self, ScanOutcome::FirstRedemption(_))
    }

    /// Whether the store recognised the code
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ScanOutcome::AlreadyRedeemed(_) | ScanOutcome::FirstRedemption(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScanOutcome::NotFound => "not_found",
            ScanOutcome::AlreadyRedeemed(_) => "already_redeemed",
            ScanOutcome::FirstRedemption(_) => "first_redemption",
            ScanOutcome::ExternalPayload(_) => "external_payload",
            ScanOutcome::Failure(_) => "failure",
        }
    }

    /// Human-readable message for display
    pub fn message(&self) -> String {
        match self {
            ScanOutcome::NotFound => "Code not found".to_string(),
            ScanOutcome::AlreadyRedeemed(at) => format!(
                "This code has already been scanned ({}).",
                at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            ScanOutcome::FirstRedemption(_) => {
                "Code scanned successfully! This is the first scan.".to_string()
            }
            ScanOutcome::ExternalPayload(_) => "This code is not from our system".to_string(),
            ScanOutcome::Failure(reason) => format!("Failed to process code scan: {}", reason),
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_redeemed_at_and_flags() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let first = ScanOutcome::FirstRedemption(at);
        let again = ScanOutcome::AlreadyRedeemed(at);

        assert_eq!(first.redeemed_at(), Some(at));
        assert_eq!(again.redeemed_at(), Some(at));
        assert!(first.is_first_redemption());
        assert!(!again.is_first_redemption());
        assert!(again.is_success());
        assert!(!ScanOutcome::NotFound.is_success());
        assert_eq!(ScanOutcome::ExternalPayload("x".into()).redeemed_at(), None);
    }

    #[test]
    fn test_messages() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            ScanOutcome::AlreadyRedeemed(at).to_string(),
            "This code has already been scanned (2026-03-01 12:00:00 UTC)."
        );
        assert_eq!(ScanOutcome::NotFound.to_string(), "Code not found");
        assert!(ScanOutcome::Failure("timeout".into()).message().ends_with("timeout"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(ScanOutcome::ExternalPayload("hello".into())).unwrap();
        assert_eq!(json["kind"], "external_payload");
        assert_eq!(json["detail"], "hello");

        let json = serde_json::to_value(ScanOutcome::NotFound).unwrap();
        assert_eq!(json["kind"], "not_found");
    }
}
