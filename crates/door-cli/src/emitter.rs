use std::io::Write;

use door_core::types::FeedbackDirective;
use door_scanner::FeedbackEmitter;

/// Terminal rendition of scanner feedback.
///
/// Human mode prints one banner line per directive and rings the terminal
/// bell once per beep on stderr. JSON mode prints one object per line.
#[derive(Debug, Clone, Copy)]
pub struct TerminalEmitter {
    json: bool,
    bell: bool,
}

impl TerminalEmitter {
    pub fn new(json: bool) -> Self {
        Self { json, bell: !json }
    }
}

/// Banner text for a directive, e.g. `✗ Already used  Jane Doe`.
pub fn banner(directive: &FeedbackDirective) -> String {
    let mut line = format!("{} {}", directive.tone.icon(), directive.message);
    if !directive.subject.is_empty() {
        line.push_str("  ");
        line.push_str(&directive.subject);
    }
    line
}

/// JSON line for a directive, including its audio/haptic signal.
pub fn feedback_event(directive: &FeedbackDirective) -> serde_json::Value {
    serde_json::json!({
        "event": "feedback",
        "tone": directive.tone,
        "message": directive.message,
        "subject": directive.subject,
        "signal": directive.signal(),
    })
}

impl FeedbackEmitter for TerminalEmitter {
    fn show(&self, directive: &FeedbackDirective) {
        let mut out = std::io::stdout().lock();
        if self.json {
            let _ = writeln!(out, "{}", feedback_event(directive));
            return;
        }
        let _ = writeln!(out, "{}", banner(directive));
        let _ = out.flush();

        let Some(signal) = directive.signal() else {
            return;
        };
        tracing::debug!(
            beeps = signal.beeps,
            frequency_hz = signal.frequency_hz,
            vibration_ms = ?signal.vibration_ms,
            "signal"
        );
        if self.bell {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "{}", "\x07".repeat(signal.beeps as usize));
            let _ = err.flush();
        }
    }

    fn clear(&self) {
        if self.json {
            println!("{}", serde_json::json!({ "event": "clear" }));
        } else {
            println!("  ready");
        }
    }
}
