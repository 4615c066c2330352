//! Version-check response parsing.
//!
//! External input is validated strictly before any local state is touched:
//! a response lacking a recognized `action`, or a BUMP without a numeric
//! `ver`, is rejected outright.

use serde_json::Value;

use super::SyncError;

/// Decoded server answer to a version check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckAction {
    /// Remote and local are believed consistent.
    Ok,
    /// Local version is stale; adopt `ver` and resend full attributes.
    Bump { ver: u64 },
    /// Discard assumptions about remote state; resend under the current
    /// version.
    Resend,
    /// Remote could not process the check; retry, bounded by the retry
    /// policy.
    Recheck,
}

impl CheckAction {
    pub fn parse(response: &Value) -> Result<Self, SyncError> {
        let action = response
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::MalformedResponse {
                reason: "missing `action` field".into(),
            })?;
        match action {
            "OK" => Ok(CheckAction::Ok),
            "BUMP" => {
                let ver = response.get("ver").and_then(Value::as_u64).ok_or_else(|| {
                    SyncError::MalformedResponse {
                        reason: "BUMP without a numeric `ver`".into(),
                    }
                })?;
                Ok(CheckAction::Bump { ver })
            }
            "RESEND" => Ok(CheckAction::Resend),
            "RECHECK" => Ok(CheckAction::Recheck),
            other => Err(SyncError::MalformedResponse {
                reason: format!("unknown action `{other}`"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_each_action() {
        assert_eq!(
            CheckAction::parse(&json!({"action": "OK"})).unwrap(),
            CheckAction::Ok
        );
        assert_eq!(
            CheckAction::parse(&json!({"action": "BUMP", "ver": 9})).unwrap(),
            CheckAction::Bump { ver: 9 }
        );
        assert_eq!(
            CheckAction::parse(&json!({"action": "RESEND"})).unwrap(),
            CheckAction::Resend
        );
        assert_eq!(
            CheckAction::parse(&json!({"action": "RECHECK"})).unwrap(),
            CheckAction::Recheck
        );
    }

    #[test]
    fn rejects_malformed_responses() {
        for bad in [
            json!({}),
            json!({"action": 1}),
            json!({"action": "NOPE"}),
            json!({"action": "BUMP"}),
            json!({"action": "BUMP", "ver": "9"}),
            json!({"action": "BUMP", "ver": -1}),
        ] {
            assert!(
                matches!(
                    CheckAction::parse(&bad),
                    Err(SyncError::MalformedResponse { .. })
                ),
                "expected rejection for {bad}"
            );
        }
    }
}
