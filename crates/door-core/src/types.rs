use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// How long a final feedback directive stays visible before it is cleared
/// and the debounce gate unlocks.
pub const FEEDBACK_DURATION: Duration = Duration::from_millis(1800);

/// Window during which re-reading the same code is ignored.
pub const SAME_CODE_COOLDOWN: Duration = Duration::from_millis(5000);

// ---------------------------------------------------------------------------
// ScanAttempt
// ---------------------------------------------------------------------------

/// One decoded-text observation from the decoder device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanAttempt {
    pub text: String,
    pub observed_at: Instant,
}

impl ScanAttempt {
    pub fn new(text: impl Into<String>, observed_at: Instant) -> Self {
        Self {
            text: text.into(),
            observed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// RejectReason
// ---------------------------------------------------------------------------

/// Server-side business rejection, as classified from the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum RejectReason {
    InvalidTicket,
    NotFound,
    InvalidDate,
    AlreadyUsed,
    Status(u16),
}

impl RejectReason {
    pub fn default_message(self) -> String {
        match self {
            RejectReason::InvalidTicket => "Invalid ticket".to_string(),
            RejectReason::NotFound => "Invalid ticket, not found".to_string(),
            RejectReason::InvalidDate => "Invalid date, not valid today".to_string(),
            RejectReason::AlreadyUsed => "Already used".to_string(),
            RejectReason::Status(code) => format!("Error ({code})"),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidTicket => f.write_str("invalid ticket"),
            RejectReason::NotFound => f.write_str("invalid ticket, not found"),
            RejectReason::InvalidDate => f.write_str("invalid date, not valid today"),
            RejectReason::AlreadyUsed => f.write_str("already used"),
            RejectReason::Status(code) => write!(f, "unexpected status {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// VerificationOutcome
// ---------------------------------------------------------------------------

/// The single result of one check-in pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Accepted {
        subject: Option<String>,
    },
    Rejected {
        reason: RejectReason,
        subject: Option<String>,
    },
    RateLimited,
    Forbidden,
    TransportError,
    Offline,
}

impl VerificationOutcome {
    pub fn tone(&self) -> Tone {
        match self {
            VerificationOutcome::Accepted { .. } => Tone::Ok,
            VerificationOutcome::RateLimited | VerificationOutcome::Offline => Tone::Warning,
            VerificationOutcome::Rejected { .. }
            | VerificationOutcome::Forbidden
            | VerificationOutcome::TransportError => Tone::Error,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            VerificationOutcome::Accepted { subject }
            | VerificationOutcome::Rejected { subject, .. } => subject.as_deref(),
            _ => None,
        }
    }

    pub fn default_message(&self) -> String {
        match self {
            VerificationOutcome::Accepted { .. } => "OK".to_string(),
            VerificationOutcome::Rejected { reason, .. } => reason.default_message(),
            VerificationOutcome::RateLimited => "Rate limited, slow down".to_string(),
            VerificationOutcome::Forbidden => "Forbidden, check scanner key".to_string(),
            VerificationOutcome::TransportError => "Network error".to_string(),
            VerificationOutcome::Offline => "Offline, cannot verify".to_string(),
        }
    }

    /// Whether a server response was received (and may carry a message override).
    pub fn has_response(&self) -> bool {
        !matches!(
            self,
            VerificationOutcome::TransportError | VerificationOutcome::Offline
        )
    }
}

// ---------------------------------------------------------------------------
// Tone
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Ok,
    Error,
    Warning,
    Checking,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Ok => "ok",
            Tone::Error => "error",
            Tone::Warning => "warning",
            Tone::Checking => "checking",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Tone::Ok => "\u{2713}",
            Tone::Error => "\u{2717}",
            Tone::Warning => "\u{26A0}",
            Tone::Checking => "\u{2026}",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Audio and haptic pattern accompanying a final directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub beeps: u8,
    pub frequency_hz: u16,
    pub vibration_ms: Vec<u16>,
}

impl Signal {
    pub fn success() -> Self {
        Self {
            beeps: 1,
            frequency_hz: 880,
            vibration_ms: vec![100],
        }
    }

    pub fn failure() -> Self {
        Self {
            beeps: 2,
            frequency_hz: 440,
            vibration_ms: vec![100, 60, 100],
        }
    }
}

// ---------------------------------------------------------------------------
// FeedbackDirective
// ---------------------------------------------------------------------------

/// Unified instruction driving the banner, beeps, and vibration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackDirective {
    pub tone: Tone,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
}

impl FeedbackDirective {
    /// Intermediate directive shown while a verification request is pending.
    pub fn checking() -> Self {
        Self {
            tone: Tone::Checking,
            message: "Checking\u{2026}".to_string(),
            subject: String::new(),
        }
    }

    /// Derive the final directive for `outcome`.
    ///
    /// A non-empty `server_message` replaces the default message, but only
    /// for outcomes where the server actually answered.
    pub fn for_outcome(outcome: &VerificationOutcome, server_message: Option<&str>) -> Self {
        let message = server_message
            .filter(|m| outcome.has_response() && !m.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| outcome.default_message());
        Self {
            tone: outcome.tone(),
            message,
            subject: outcome.subject().unwrap_or_default().to_string(),
        }
    }

    /// Audio/haptic pattern for this directive; `None` while checking.
    pub fn signal(&self) -> Option<Signal> {
        match self.tone {
            Tone::Checking => None,
            Tone::Ok => Some(Signal::success()),
            Tone::Error | Tone::Warning => Some(Signal::failure()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
