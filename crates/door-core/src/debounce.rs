//! Scan debounce gate.
//!
//! Filters raw decode events down to admissible scan attempts. At most one
//! admitted attempt is outstanding at a time: the gate stays locked from
//! admission until its [`LockTicket`] is handed back through
//! [`DebounceGate::unlock`], which the session does only after the feedback
//! window has elapsed.

use std::time::{Duration, Instant};

use crate::types::{ScanAttempt, SAME_CODE_COOLDOWN};

// ---------------------------------------------------------------------------
// LockTicket / Admission
// ---------------------------------------------------------------------------

/// Identifies one lock period. Stale tickets cannot release a newer lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(LockTicket),
    /// A verification is in flight or its feedback is still on screen.
    Locked,
    /// The same code was accepted less than the cooldown ago.
    Cooldown,
}

impl Admission {
    pub fn ticket(self) -> Option<LockTicket> {
        match self {
            Admission::Admitted(t) => Some(t),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DebounceState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DebounceState {
    pub last_accepted_text: Option<String>,
    pub last_accepted_at: Option<Instant>,
    locked: Option<LockTicket>,
}

impl DebounceState {
    pub fn locked(&self) -> bool {
        self.locked.is_some()
    }
}

// ---------------------------------------------------------------------------
// DebounceGate
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DebounceGate {
    state: DebounceState,
    cooldown: Duration,
    next_ticket: u64,
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(SAME_CODE_COOLDOWN)
    }
}

impl DebounceGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: DebounceState::default(),
            cooldown,
            next_ticket: 0,
        }
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state.locked()
    }

    /// Decide whether `attempt` may be submitted. Rules apply in order:
    /// locked rejects, same text inside the cooldown rejects, anything else
    /// locks the gate and records the attempt.
    pub fn admit(&mut self, attempt: &ScanAttempt) -> Admission {
        if self.state.locked() {
            return Admission::Locked;
        }

        let last = (&self.state.last_accepted_text, self.state.last_accepted_at);
        if let (Some(text), Some(at)) = last {
            let elapsed = attempt.observed_at.saturating_duration_since(at);
            if *text == attempt.text && elapsed < self.cooldown {
                return Admission::Cooldown;
            }
        }

        self.next_ticket += 1;
        let ticket = LockTicket(self.next_ticket);
        self.state.locked = Some(ticket);
        self.state.last_accepted_text = Some(attempt.text.clone());
        self.state.last_accepted_at = Some(attempt.observed_at);
        Admission::Admitted(ticket)
    }

    /// Release the lock held by `ticket`. Returns false (and changes nothing)
    /// when the gate is already unlocked or a different lock is current.
    pub fn unlock(&mut self, ticket: LockTicket) -> bool {
        if self.state.locked == Some(ticket) {
            self.state.locked = None;
            true
        } else {
            false
        }
    }

    /// End-of-session reset: clears the lock but keeps the last accepted
    /// text and time, so the cooldown survives a stop/start cycle.
    pub fn reset(&mut self) {
        self.state.locked = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn first_attempt_is_admitted_and_locks() {
        let mut gate = DebounceGate::default();
        let t0 = Instant::now();
        let adm = gate.admit(&ScanAttempt::new("ABC123", t0));
        assert!(matches!(adm, Admission::Admitted(_)));
        assert!(gate.is_locked());
        assert_eq!(gate.state().last_accepted_text.as_deref(), Some("ABC123"));
    }

    #[test]
    fn locked_gate_rejects_any_text() {
        let mut gate = DebounceGate::default();
        let t0 = Instant::now();
        gate.admit(&ScanAttempt::new("A", t0));
        assert_eq!(gate.admit(&ScanAttempt::new("B", at(t0, 10))), Admission::Locked);
        assert_eq!(gate.admit(&ScanAttempt::new("A", at(t0, 9000))), Admission::Locked);
    }

    #[test]
    fn same_code_within_cooldown_is_suppressed() {
        let mut gate = DebounceGate::default();
        let t0 = Instant::now();
        let ticket = gate.admit(&ScanAttempt::new("A", t0)).ticket().unwrap();
        assert!(gate.unlock(ticket));
        assert_eq!(
            gate.admit(&ScanAttempt::new("A", at(t0, 4999))),
            Admission::Cooldown
        );
        assert!(!gate.is_locked());
    }

    #[test]
    fn same_code_after_cooldown_is_admitted() {
        let mut gate = DebounceGate::default();
        let t0 = Instant::now();
        let ticket = gate.admit(&ScanAttempt::new("A", t0)).ticket().unwrap();
        gate.unlock(ticket);
        assert!(gate
            .admit(&ScanAttempt::new("A", at(t0, 5000)))
            .ticket()
            .is_some());
    }

    #[test]
    fn different_code_inside_cooldown_is_admitted() {
        let mut gate = DebounceGate::default();
        let t0 = Instant::now();
        let ticket = gate.admit(&ScanAttempt::new("A", t0)).ticket().unwrap();
        gate.unlock(ticket);
        assert!(gate
            .admit(&ScanAttempt::new("B", at(t0, 100)))
            .ticket()
            .is_some());
    }

    #[test]
    fn stale_ticket_cannot_unlock_newer_lock() {
        let mut gate = DebounceGate::default();
        let t0 = Instant::now();
        let first = gate.admit(&ScanAttempt::new("A", t0)).ticket().unwrap();
        gate.reset();
        let second = gate.admit(&ScanAttempt::new("B", at(t0, 1))).ticket().unwrap();
        assert_ne!(first, second);
        assert!(!gate.unlock(first));
        assert!(gate.is_locked());
        assert!(gate.unlock(second));
        assert!(!gate.unlock(second), "unlock is idempotent");
    }

    #[test]
    fn reset_keeps_cooldown_memory() {
        let mut gate = DebounceGate::default();
        let t0 = Instant::now();
        gate.admit(&ScanAttempt::new("A", t0));
        gate.reset();
        assert!(!gate.is_locked());
        assert_eq!(
            gate.admit(&ScanAttempt::new("A", at(t0, 1000))),
            Admission::Cooldown
        );
    }

    #[test]
    fn custom_cooldown_is_respected() {
        let mut gate = DebounceGate::new(Duration::from_millis(100));
        let t0 = Instant::now();
        let t = gate.admit(&ScanAttempt::new("A", t0)).ticket().unwrap();
        gate.unlock(t);
        assert!(gate.admit(&ScanAttempt::new("A", at(t0, 100))).ticket().is_some());
    }
}
