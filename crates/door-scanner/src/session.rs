use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use door_core::debounce::{Admission, DebounceGate, LockTicket};
use door_core::types::{
    FeedbackDirective, ScanAttempt, Tone, VerificationOutcome, FEEDBACK_DURATION,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Sleep};
use uuid::Uuid;

use crate::feedback::FeedbackEmitter;
use crate::pipeline::Verifier;

// ─── SessionStats ─────────────────────────────────────────────────────────

/// Counters for one [`ScanSession::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub decoded: u64,
    pub admitted: u64,
    pub suppressed_locked: u64,
    pub suppressed_cooldown: u64,
    pub ok: u64,
    pub warning: u64,
    pub error: u64,
}

impl SessionStats {
    fn record(&mut self, tone: Tone) {
        match tone {
            Tone::Ok => self.ok += 1,
            Tone::Warning => self.warning += 1,
            Tone::Error => self.error += 1,
            Tone::Checking => {}
        }
    }
}

// ─── ScanSession ──────────────────────────────────────────────────────────

struct InFlight {
    ticket: LockTicket,
    handle: JoinHandle<VerificationOutcome>,
}

struct PendingUnlock {
    ticket: LockTicket,
    deadline: Instant,
    sleep: Pin<Box<Sleep>>,
}

/// Drives decode events through the debounce gate into the verifier.
///
/// A session can be run repeatedly (start, stop, start again); the gate and
/// therefore the same-code cooldown persist across runs. A verification
/// left in flight by a stopped run keeps the session locked until its
/// feedback has been cleared.
pub struct ScanSession<V: Verifier> {
    id: Uuid,
    gate: DebounceGate,
    verifier: Arc<V>,
    emitter: Arc<dyn FeedbackEmitter>,
    feedback: Duration,
    /// Bumped on every admission; a deferred clear only fires if unchanged.
    admissions: Arc<AtomicU64>,
    carryover: Option<JoinHandle<()>>,
    detached: Vec<JoinHandle<()>>,
}

impl<V: Verifier> ScanSession<V> {
    pub fn new(verifier: Arc<V>, emitter: Arc<dyn FeedbackEmitter>) -> Self {
        Self {
            id: Uuid::new_v4(),
            gate: DebounceGate::default(),
            verifier,
            emitter,
            feedback: FEEDBACK_DURATION,
            admissions: Arc::new(AtomicU64::new(0)),
            carryover: None,
            detached: Vec::new(),
        }
    }

    pub fn with_timing(mut self, feedback: Duration, cooldown: Duration) -> Self {
        self.feedback = feedback;
        self.gate = DebounceGate::new(cooldown);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn gate(&self) -> &DebounceGate {
        &self.gate
    }

    /// Wait for work left behind by earlier runs: verifications that were
    /// still in flight at stop, and feedback still on display.
    pub async fn finish(&mut self) {
        if let Some(handle) = self.carryover.take() {
            let _ = handle.await;
        }
        for handle in self.detached.drain(..) {
            let _ = handle.await;
        }
    }

    /// Whether a verification from a stopped run is still running or
    /// still on display.
    fn carryover_busy(&self) -> bool {
        self.carryover.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Consume decodes until `stream` ends or `shutdown` resolves.
    ///
    /// On exit the pending gate unlock is cancelled and the gate is reset.
    /// A verification still in flight is not cancelled: it finishes in a
    /// detached task and its feedback is cleared after the usual window.
    pub async fn run<S, F>(&mut self, stream: S, shutdown: F) -> SessionStats
    where
        S: Stream<Item = String> + Unpin,
        F: Future<Output = ()>,
    {
        let mut stream = stream;
        let mut shutdown = std::pin::pin!(shutdown);
        let mut in_flight: Option<InFlight> = None;
        let mut unlock: Option<PendingUnlock> = None;
        let mut stats = SessionStats::default();

        tracing::info!(session = %self.id, "scan session started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!(session = %self.id, "scan session stopping");
                    break;
                }
                (ticket, joined) = next_completion(&mut in_flight) => {
                    let tone = self.settle(joined);
                    stats.record(tone);
                    let deadline = Instant::now() + self.feedback;
                    unlock = Some(PendingUnlock {
                        ticket,
                        deadline,
                        sleep: Box::pin(tokio::time::sleep_until(deadline)),
                    });
                }
                ticket = next_unlock(&mut unlock) => {
                    self.emitter.clear();
                    self.gate.unlock(ticket);
                    tracing::debug!(session = %self.id, "gate unlocked");
                }
                next = stream.next() => {
                    let Some(text) = next else {
                        tracing::info!(session = %self.id, "decoder stream ended");
                        break;
                    };
                    stats.decoded += 1;
                    if let Some(job) = self.on_decode(text, &mut stats) {
                        in_flight = Some(job);
                    }
                }
            }
        }

        self.wind_down(in_flight, unlock);
        tracing::info!(session = %self.id, stats = ?stats, "scan session stopped");
        stats
    }

    fn on_decode(&mut self, text: String, stats: &mut SessionStats) -> Option<InFlight> {
        if self.carryover_busy() {
            stats.suppressed_locked += 1;
            tracing::trace!("decode ignored; previous run's verification still pending");
            return None;
        }
        let attempt = ScanAttempt::new(text, Instant::now().into_std());
        match self.gate.admit(&attempt) {
            Admission::Locked => {
                stats.suppressed_locked += 1;
                tracing::trace!(text = %attempt.text, "decode ignored; gate locked");
                None
            }
            Admission::Cooldown => {
                stats.suppressed_cooldown += 1;
                tracing::debug!(text = %attempt.text, "decode ignored; same code in cooldown");
                None
            }
            Admission::Admitted(ticket) => {
                stats.admitted += 1;
                self.admissions.fetch_add(1, Ordering::SeqCst);
                tracing::info!(session = %self.id, token_len = attempt.text.len(), "scan admitted");
                let verifier = Arc::clone(&self.verifier);
                let handle = tokio::spawn(async move { verifier.verify(attempt.text).await });
                Some(InFlight { ticket, handle })
            }
        }
    }

    /// Tone of a finished verification. A verifier that panicked produced
    /// no feedback, so a transport-error directive is shown in its place.
    fn settle(&self, joined: Result<VerificationOutcome, JoinError>) -> Tone {
        settle_with(self.emitter.as_ref(), joined)
    }

    fn wind_down(&mut self, in_flight: Option<InFlight>, unlock: Option<PendingUnlock>) {
        self.gate.reset();

        self.detached.retain(|h| !h.is_finished());

        if let Some(p) = unlock {
            let emitter = Arc::clone(&self.emitter);
            let admissions = Arc::clone(&self.admissions);
            let seen = admissions.load(Ordering::SeqCst);
            let deadline = p.deadline;
            self.detached.push(tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                // A scan admitted by a later run owns the display now.
                if admissions.load(Ordering::SeqCst) == seen {
                    emitter.clear();
                }
            }));
        }

        if let Some(job) = in_flight {
            tracing::info!(session = %self.id, "verification still in flight; finishing detached");
            let emitter = Arc::clone(&self.emitter);
            let feedback = self.feedback;
            self.carryover = Some(tokio::spawn(async move {
                let joined = job.handle.await;
                settle_with(emitter.as_ref(), joined);
                tokio::time::sleep(feedback).await;
                emitter.clear();
            }));
        }
    }
}

fn settle_with(
    emitter: &dyn FeedbackEmitter,
    joined: Result<VerificationOutcome, JoinError>,
) -> Tone {
    match joined {
        Ok(outcome) => outcome.tone(),
        Err(e) => {
            tracing::error!(error = %e, "verification task failed");
            let outcome = VerificationOutcome::TransportError;
            emitter.show(&FeedbackDirective::for_outcome(&outcome, None));
            outcome.tone()
        }
    }
}

async fn next_completion(
    slot: &mut Option<InFlight>,
) -> (LockTicket, Result<VerificationOutcome, JoinError>) {
    match slot {
        Some(job) => {
            let joined = (&mut job.handle).await;
            let ticket = job.ticket;
            *slot = None;
            (ticket, joined)
        }
        None => pending().await,
    }
}

async fn next_unlock(slot: &mut Option<PendingUnlock>) -> LockTicket {
    match slot {
        Some(p) => {
            p.sleep.as_mut().await;
            let ticket = p.ticket;
            *slot = None;
            ticket
        }
        None => pending().await,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{Emitted, RecordingEmitter};
    use crate::stream::DecodeStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{mpsc, oneshot};

    /// Accepts everything after `delay`, tracking concurrency.
    struct FakeVerifier {
        delay: Duration,
        emitter: Arc<RecordingEmitter>,
        calls: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        panic_on: Option<&'static str>,
    }

    impl FakeVerifier {
        fn new(delay_ms: u64, emitter: Arc<RecordingEmitter>) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                emitter,
                calls: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                panic_on: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Verifier for FakeVerifier {
        fn verify(&self, text: String) -> impl Future<Output = VerificationOutcome> + Send {
            async move {
                self.calls.lock().unwrap().push(text.clone());
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active.fetch_max(now, Ordering::SeqCst);
                self.emitter.show(&FeedbackDirective::checking());
                tokio::time::sleep(self.delay).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                if self.panic_on == Some(text.as_str()) {
                    panic!("verifier blew up");
                }
                let outcome = VerificationOutcome::Accepted {
                    subject: Some(text),
                };
                self.emitter
                    .show(&FeedbackDirective::for_outcome(&outcome, None));
                outcome
            }
        }
    }

    struct Harness {
        tx: mpsc::Sender<String>,
        stop: oneshot::Sender<()>,
        done: JoinHandle<(ScanSession<FakeVerifier>, SessionStats)>,
    }

    fn start(mut session: ScanSession<FakeVerifier>) -> Harness {
        let (tx, rx) = mpsc::channel(16);
        let (stop, stopped) = oneshot::channel::<()>();
        let done = tokio::spawn(async move {
            let stats = session
                .run(DecodeStream::from_channel(rx), async {
                    let _ = stopped.await;
                })
                .await;
            (session, stats)
        });
        Harness { tx, stop, done }
    }

    impl Harness {
        async fn scan(&self, text: &str) {
            self.tx.send(text.to_string()).await.unwrap();
            tokio::task::yield_now().await;
        }

        async fn finish(self) -> (ScanSession<FakeVerifier>, SessionStats) {
            let _ = self.stop.send(());
            self.done.await.unwrap()
        }
    }

    async fn wait_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn session(
        delay_ms: u64,
    ) -> (
        Arc<FakeVerifier>,
        Arc<RecordingEmitter>,
        ScanSession<FakeVerifier>,
    ) {
        let emitter = Arc::new(RecordingEmitter::default());
        let verifier = Arc::new(FakeVerifier::new(delay_ms, emitter.clone()));
        let s = ScanSession::new(verifier.clone(), emitter.clone());
        (verifier, emitter, s)
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_verification_in_flight() {
        let (verifier, _emitter, s) = session(3000);
        let h = start(s);

        h.scan("A").await;
        wait_ms(1000).await;
        h.scan("B").await;
        wait_ms(1000).await;
        h.scan("C").await;
        // A completes at 3000, gate unlocks at 4800.
        wait_ms(3000).await;
        h.scan("D").await;
        wait_ms(4000).await;

        let (_, stats) = h.finish().await;
        assert_eq!(verifier.calls(), vec!["A", "D"]);
        assert_eq!(verifier.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(stats.suppressed_locked, 2);
        assert_eq!(stats.admitted, 2);
        assert_eq!(stats.ok, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn same_code_is_submitted_once_inside_cooldown() {
        let (verifier, _emitter, s) = session(100);
        let h = start(s);

        h.scan("ABC123").await;
        wait_ms(3000).await;
        h.scan("ABC123").await;
        wait_ms(100).await;

        let (_, stats) = h.finish().await;
        assert_eq!(verifier.calls(), vec!["ABC123"]);
        assert_eq!(stats.suppressed_cooldown, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn same_code_is_resubmitted_after_cooldown() {
        let (verifier, _emitter, s) = session(100);
        let h = start(s);

        h.scan("ABC123").await;
        wait_ms(5100).await;
        h.scan("ABC123").await;
        wait_ms(500).await;

        let (_, stats) = h.finish().await;
        assert_eq!(verifier.calls(), vec!["ABC123", "ABC123"]);
        assert_eq!(stats.admitted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_unlocks_only_after_feedback_window() {
        let (verifier, emitter, s) = session(100);
        let h = start(s);

        h.scan("A").await;
        // Outcome at 100ms, unlock at 1900ms.
        wait_ms(1700).await;
        h.scan("B").await;
        assert_eq!(emitter.clears(), 0);
        wait_ms(300).await;
        assert_eq!(emitter.clears(), 1);
        h.scan("B").await;
        wait_ms(200).await;

        let (_, stats) = h.finish().await;
        assert_eq!(verifier.calls(), vec!["A", "B"]);
        assert_eq!(stats.suppressed_locked, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_admitted_scan_gets_exactly_one_final_directive() {
        let (_verifier, emitter, s) = session(50);
        let h = start(s);

        for code in ["A", "B", "C"] {
            h.scan(code).await;
            wait_ms(2000).await;
        }

        let (_, stats) = h.finish().await;
        assert_eq!(stats.admitted, 3);
        let finals: Vec<String> = emitter.finals().into_iter().map(|d| d.subject).collect();
        assert_eq!(finals, vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_cooldown_memory() {
        let (verifier, _emitter, s) = session(100);
        let h = start(s);
        h.scan("A").await;
        wait_ms(2500).await;
        let (session, _) = h.finish().await;
        assert!(!session.gate().is_locked());

        let h = start(session);
        h.scan("A").await;
        wait_ms(100).await;
        let (_, stats) = h.finish().await;

        assert_eq!(verifier.calls(), vec!["A"]);
        assert_eq!(stats.suppressed_cooldown, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_flight_still_delivers_feedback() {
        let (verifier, emitter, s) = session(1000);
        let h = start(s);
        h.scan("A").await;
        wait_ms(500).await;
        let (session, stats) = h.finish().await;

        assert_eq!(stats.admitted, 1);
        assert!(!session.gate().is_locked(), "stop resets the lock");
        assert!(emitter.finals().is_empty());

        wait_ms(600).await;
        assert_eq!(emitter.finals().len(), 1, "outcome delivered after stop");
        assert_eq!(emitter.clears(), 0);

        wait_ms(1900).await;
        assert_eq!(emitter.clears(), 1);
        assert_eq!(verifier.calls(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_waits_for_detached_verification() {
        let (_verifier, emitter, s) = session(1000);
        let h = start(s);
        h.scan("A").await;
        wait_ms(100).await;
        let (mut session, _) = h.finish().await;

        session.finish().await;
        assert_eq!(emitter.finals().len(), 1);
        assert_eq!(emitter.clears(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_feedback_visible_still_clears_it() {
        let (_verifier, emitter, s) = session(100);
        let h = start(s);
        h.scan("A").await;
        wait_ms(500).await;
        let (session, _) = h.finish().await;
        assert!(!session.gate().is_locked());
        assert_eq!(emitter.clears(), 0);

        wait_ms(1500).await;
        assert_eq!(emitter.clears(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_verifier_becomes_transport_error() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mut verifier = FakeVerifier::new(10, emitter.clone());
        verifier.panic_on = Some("BOOM");
        let s = ScanSession::new(Arc::new(verifier), emitter.clone());
        let h = start(s);

        h.scan("BOOM").await;
        wait_ms(2000).await;
        h.scan("OK").await;
        wait_ms(100).await;

        let (_, stats) = h.finish().await;
        assert_eq!(stats.error, 1);
        assert_eq!(stats.ok, 1);
        let finals = emitter.finals();
        assert_eq!(finals[0].message, "Network error");
        assert!(emitter
            .snapshot()
            .iter()
            .any(|e| matches!(e, Emitted::Clear)));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_stops_the_session() {
        let (_verifier, _emitter, mut s) = session(10);
        let input: &[u8] = b"X\n";
        let stats = s
            .run(DecodeStream::from_reader(input, 4), pending::<()>())
            .await;
        assert_eq!(stats.decoded, 1);
        assert!(!s.gate().is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_timing_shortens_the_window() {
        let (verifier, _emitter, s) = session(10);
        let s = s.with_timing(Duration::from_millis(200), Duration::from_millis(300));
        let h = start(s);

        h.scan("A").await;
        wait_ms(400).await;
        h.scan("A").await;
        wait_ms(50).await;

        let (_, stats) = h.finish().await;
        assert_eq!(verifier.calls(), vec!["A", "A"]);
        assert_eq!(stats.suppressed_cooldown, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_new_feedback_for_full_window() {
        let (verifier, emitter, s) = session(100);
        let h = start(s);
        h.scan("A").await;
        // A's feedback would clear at 1900.
        wait_ms(500).await;
        let (session, _) = h.finish().await;

        let h = start(session);
        h.scan("B").await;
        // B's outcome lands at 600 and must stay until 2400.
        wait_ms(1450).await;
        assert_eq!(emitter.finals().len(), 2);
        assert_eq!(emitter.clears(), 0);

        wait_ms(500).await;
        assert_eq!(emitter.clears(), 1);
        let (mut session, _) = h.finish().await;
        session.finish().await;
        assert_eq!(emitter.clears(), 1);
        assert_eq!(verifier.calls(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_waits_for_previous_verification() {
        let (verifier, emitter, s) = session(3000);
        let h = start(s);
        h.scan("A").await;
        wait_ms(500).await;
        let (session, _) = h.finish().await;

        let h = start(session);
        h.scan("B").await;
        // A completes at 3000 and clears at 4800.
        wait_ms(4000).await;
        h.scan("C").await;
        wait_ms(500).await;
        assert_eq!(emitter.clears(), 1);
        h.scan("D").await;
        wait_ms(3100).await;

        let (_, stats) = h.finish().await;
        assert_eq!(verifier.calls(), vec!["A", "D"]);
        assert_eq!(verifier.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(stats.suppressed_locked, 2);
        assert_eq!(stats.admitted, 1);
    }
}
