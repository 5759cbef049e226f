use door_core::types::FeedbackDirective;

// ─── FeedbackEmitter ──────────────────────────────────────────────────────

/// Sink for feedback directives (banner, audio, vibration).
///
/// `show` may be called with an intermediate `checking` directive followed
/// by exactly one final directive per verification. `clear` is called when
/// the final directive's display window has elapsed.
pub trait FeedbackEmitter: Send + Sync {
    fn show(&self, directive: &FeedbackDirective);
    fn clear(&self);
}

/// Emitter that only logs; used when no display is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmitter;

impl FeedbackEmitter for TracingEmitter {
    fn show(&self, directive: &FeedbackDirective) {
        tracing::info!(
            tone = %directive.tone,
            message = %directive.message,
            subject = %directive.subject,
            "feedback"
        );
    }

    fn clear(&self) {
        tracing::debug!("feedback cleared");
    }
}

/// Records every call, for assertions in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingEmitter {
    pub events: std::sync::Mutex<Vec<Emitted>>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Emitted {
    Show(FeedbackDirective),
    Clear,
}

#[cfg(test)]
impl RecordingEmitter {
    pub fn snapshot(&self) -> Vec<Emitted> {
        self.events.lock().unwrap().clone()
    }

    /// Final (non-checking) directives shown so far.
    pub fn finals(&self) -> Vec<FeedbackDirective> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                Emitted::Show(d) if d.tone != door_core::types::Tone::Checking => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn clears(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|e| matches!(e, Emitted::Clear))
            .count()
    }
}

#[cfg(test)]
impl FeedbackEmitter for RecordingEmitter {
    fn show(&self, directive: &FeedbackDirective) {
        self.events
            .lock()
            .unwrap()
            .push(Emitted::Show(directive.clone()));
    }

    fn clear(&self) {
        self.events.lock().unwrap().push(Emitted::Clear);
    }
}
