//! Classification of check-in responses into [`VerificationOutcome`]s.
//!
//! The server's payload shape varies between deployments, so extraction is
//! tolerant: a body that is not JSON, or JSON of an unexpected shape, yields
//! an empty payload rather than an error.

use serde_json::Value;

use crate::types::{RejectReason, VerificationOutcome};

// ---------------------------------------------------------------------------
// ResponsePayload
// ---------------------------------------------------------------------------

/// Fields of interest pulled out of a verification response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePayload {
    pub subject: Option<String>,
    pub message: Option<String>,
}

impl ResponsePayload {
    pub fn parse(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };
        Self {
            subject: extract_subject(&value),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        }
    }
}

/// Attendee name, tried as `attendee` (string), then `attendee.name`, then `name`.
pub fn extract_subject(value: &Value) -> Option<String> {
    if let Some(s) = value.get("attendee").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(s) = value
        .get("attendee")
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
    {
        return Some(s.to_string());
    }
    value.get("name").and_then(Value::as_str).map(str::to_string)
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

/// Map an HTTP status and its parsed payload to an outcome.
///
/// Only accepted and already-used verdicts carry the attendee name.
pub fn classify(status: u16, payload: &ResponsePayload) -> VerificationOutcome {
    let subject = payload.subject.clone().filter(|s| !s.is_empty());
    match status {
        200..=299 => VerificationOutcome::Accepted { subject },
        400 => VerificationOutcome::Rejected {
            reason: RejectReason::InvalidTicket,
            subject: None,
        },
        403 => VerificationOutcome::Forbidden,
        404 => VerificationOutcome::Rejected {
            reason: RejectReason::NotFound,
            subject: None,
        },
        408 => VerificationOutcome::Rejected {
            reason: RejectReason::InvalidDate,
            subject: None,
        },
        409 => VerificationOutcome::Rejected {
            reason: RejectReason::AlreadyUsed,
            subject,
        },
        429 => VerificationOutcome::RateLimited,
        other => VerificationOutcome::Rejected {
            reason: RejectReason::Status(other),
            subject: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
