//! [`RobotStateMachine`] – the single lock guarding [`RobotMode`] and the
//! [`AutonomousSession`].
//!
//! # Transitions
//!
//! ```text
//!   Idle ──dispatch──▶ Moving / ExecutingAction ──stop / done──▶ Idle
//!   Idle ──enable────▶ Autonomous ──cancel (takeover, disable, fault, shutdown)──▶ Idle
//! ```
//!
//! `Autonomous` is entered only through [`RobotStateMachine::enable_autonomy`]
//! and left only through a cancellation, so `mode == Autonomous` holds exactly
//! while `session.active` is true.  Dispatch-driven transitions requested
//! through [`RobotStateMachine::transition`] are ignored while a session runs.
//!
//! Producers go through [`RobotStateMachine::admit`], which decides under the
//! lock whether an intent may be queued and runs the caller's enqueue closure
//! inside the same critical section.  A manual intent arriving during a
//! session therefore cancels it and is queued before any other producer can
//! observe the intermediate state.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use strider_types::{CancelReason, Origin, RobotMode, StriderError};
use tracing::info;

/// Bookkeeping for the autonomous routine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutonomousSession {
    pub active: bool,
    pub cancel_requested: bool,
    /// Monotonic session number; bumped on every enable.
    pub generation: u64,
    pub sequence_index: usize,
    pub phase_started_at: Option<Instant>,
    pub cancel_reason: Option<CancelReason>,
}

/// Outcome of [`RobotStateMachine::admit`] handed to the enqueue closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queue the intent as-is.
    Granted,
    /// The intent cancelled autonomous session `session`; queue the session's
    /// stop-and-recenter first.
    Takeover { session: u64 },
}

/// A mode change, reported so callers can log or publish it.
pub type Transition = (RobotMode, RobotMode);

#[derive(Debug, Default)]
struct Inner {
    mode: RobotMode,
    session: AutonomousSession,
}

impl Inner {
    fn set_mode(&mut self, to: RobotMode) -> Option<Transition> {
        let from = self.mode;
        if from == to {
            return None;
        }
        self.mode = to;
        info!(%from, %to, "robot mode transition");
        Some((from, to))
    }

    fn is_live(&self, session: u64) -> bool {
        self.session.active && !self.session.cancel_requested && self.session.generation == session
    }

    fn cancel(&mut self, reason: CancelReason) -> Option<u64> {
        if !self.session.active {
            return None;
        }
        self.session.active = false;
        self.session.cancel_requested = true;
        self.session.cancel_reason = Some(reason);
        info!(session = self.session.generation, ?reason, "autonomous session cancelled");
        self.set_mode(RobotMode::Idle);
        Some(self.session.generation)
    }
}

#[derive(Debug, Default)]
pub struct RobotStateMachine {
    inner: Mutex<Inner>,
}

impl RobotStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent across a panicking holder: every mutation is
        // a handful of plain field writes.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> RobotMode {
        self.lock().mode
    }

    pub fn session(&self) -> AutonomousSession {
        self.lock().session.clone()
    }

    pub fn is_autonomous(&self) -> bool {
        self.lock().session.active
    }

    /// Mode and autonomy flag read under one lock.
    pub fn mode_with_autonomy(&self) -> (RobotMode, bool) {
        let inner = self.lock();
        (inner.mode, inner.session.active)
    }

    /// Whether intents from autonomous session `session` may still be
    /// queued or dispatched.
    pub fn is_live(&self, session: u64) -> bool {
        self.lock().is_live(session)
    }

    /// Cancellation checkpoint for the scheduler of session `session`.
    pub fn should_continue(&self, session: u64) -> bool {
        self.is_live(session)
    }

    /// Gate a producer and, if admitted, run `enqueue` under the state lock.
    ///
    /// - `Manual` is always admitted.  During a session it cancels the
    ///   session with [`CancelReason::ManualTakeover`] first and receives
    ///   [`Admission::Takeover`]; the cancellation stands even if `enqueue`
    ///   then fails.
    /// - `Autonomous { session }` is admitted only while that session is
    ///   live, otherwise [`StriderError::Preempted`].
    /// - `Cleanup` is always admitted.
    ///
    /// `enqueue` must not block.
    pub fn admit<R>(
        &self,
        origin: Origin,
        enqueue: impl FnOnce(Admission) -> Result<R, StriderError>,
    ) -> Result<R, StriderError> {
        let mut inner = self.lock();
        let admission = match origin {
            Origin::Manual => match inner.cancel(CancelReason::ManualTakeover) {
                Some(session) => Admission::Takeover { session },
                None => Admission::Granted,
            },
            Origin::Autonomous { session } => {
                if !inner.is_live(session) {
                    return Err(StriderError::Preempted(format!(
                        "autonomous session {session} is no longer active"
                    )));
                }
                Admission::Granted
            }
            Origin::Cleanup { .. } => Admission::Granted,
        };
        enqueue(admission)
    }

    /// Start a new session.  Returns its generation, or `None` when a session
    /// is already active.
    pub fn enable_autonomy(&self) -> Option<u64> {
        let mut inner = self.lock();
        if inner.session.active {
            return None;
        }
        let generation = inner.session.generation + 1;
        inner.session = AutonomousSession {
            active: true,
            cancel_requested: false,
            generation,
            sequence_index: 0,
            phase_started_at: Some(Instant::now()),
            cancel_reason: None,
        };
        info!(session = generation, "autonomous session started");
        inner.set_mode(RobotMode::Autonomous);
        Some(generation)
    }

    /// Cancel the active session.  Returns the cancelled generation, or
    /// `None` when no session was active.
    pub fn cancel_autonomy(&self, reason: CancelReason) -> Option<u64> {
        self.lock().cancel(reason)
    }

    /// Record that session `session` entered phase `index`.  Ignored for a
    /// stale session.
    pub fn begin_phase(&self, session: u64, index: usize) {
        let mut inner = self.lock();
        if inner.is_live(session) {
            inner.session.sequence_index = index;
            inner.session.phase_started_at = Some(Instant::now());
        }
    }

    /// Dispatch-driven mode change.  Never enters or leaves `Autonomous`.
    pub fn transition(&self, to: RobotMode) -> Option<Transition> {
        let mut inner = self.lock();
        if inner.session.active || to == RobotMode::Autonomous {
            return None;
        }
        inner.set_mode(to)
    }

    /// Actuator fault: end any session and force `Idle`.
    pub fn force_idle(&self, reason: CancelReason) -> Option<Transition> {
        let mut inner = self.lock();
        let from = inner.mode;
        inner.cancel(reason);
        inner.set_mode(RobotMode::Idle);
        (from != RobotMode::Idle).then_some((from, RobotMode::Idle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_without_session() {
        let sm = RobotStateMachine::new();
        assert_eq!(sm.mode(), RobotMode::Idle);
        assert!(!sm.session().active);
    }

    #[test]
    fn enable_is_idempotent() {
        let sm = RobotStateMachine::new();
        assert_eq!(sm.enable_autonomy(), Some(1));
        assert_eq!(sm.enable_autonomy(), None);
        assert_eq!(sm.mode(), RobotMode::Autonomous);
        assert_eq!(sm.session().generation, 1);
    }

    #[test]
    fn disable_when_off_is_noop() {
        let sm = RobotStateMachine::new();
        assert_eq!(sm.cancel_autonomy(CancelReason::Disabled), None);
        assert_eq!(sm.mode(), RobotMode::Idle);
        assert_eq!(sm.session().cancel_reason, None);
    }

    #[test]
    fn manual_admission_cancels_session_before_enqueue() {
        let sm = RobotStateMachine::new();
        let session = sm.enable_autonomy().unwrap();

        let seen = sm
            .admit(Origin::Manual, |admission| {
                // Already idle while the intent is being queued.
                Ok(admission)
            })
            .unwrap();

        assert_eq!(seen, Admission::Takeover { session });
        assert_eq!(sm.mode(), RobotMode::Idle);
        let s = sm.session();
        assert!(!s.active);
        assert!(s.cancel_requested);
        assert_eq!(s.cancel_reason, Some(CancelReason::ManualTakeover));
        assert!(!sm.should_continue(session));
    }

    #[test]
    fn manual_admission_when_idle_is_granted() {
        let sm = RobotStateMachine::new();
        let seen = sm.admit(Origin::Manual, Ok).unwrap();
        assert_eq!(seen, Admission::Granted);
    }

    #[test]
    fn takeover_stands_when_enqueue_fails() {
        let sm = RobotStateMachine::new();
        sm.enable_autonomy();
        let result: Result<(), _> = sm.admit(Origin::Manual, |_| Err(StriderError::QueueFull));
        assert_eq!(result, Err(StriderError::QueueFull));
        assert!(!sm.is_autonomous());
    }

    #[test]
    fn stale_autonomous_intent_is_preempted() {
        let sm = RobotStateMachine::new();
        let first = sm.enable_autonomy().unwrap();
        assert!(sm.admit(Origin::Autonomous { session: first }, Ok).is_ok());

        sm.cancel_autonomy(CancelReason::Disabled);
        let second = sm.enable_autonomy().unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            sm.admit(Origin::Autonomous { session: first }, Ok),
            Err(StriderError::Preempted(_))
        ));
        assert!(sm.admit(Origin::Autonomous { session: second }, Ok).is_ok());
    }

    #[test]
    fn cleanup_is_admitted_after_cancel() {
        let sm = RobotStateMachine::new();
        let session = sm.enable_autonomy().unwrap();
        sm.cancel_autonomy(CancelReason::Disabled);
        assert!(sm.admit(Origin::Cleanup { session }, Ok).is_ok());
    }

    #[test]
    fn dispatch_transitions_ignored_while_autonomous() {
        let sm = RobotStateMachine::new();
        sm.enable_autonomy();
        assert_eq!(sm.transition(RobotMode::Moving), None);
        assert_eq!(sm.mode(), RobotMode::Autonomous);
    }

    #[test]
    fn dispatch_transitions_follow_actuation() {
        let sm = RobotStateMachine::new();
        assert_eq!(
            sm.transition(RobotMode::Moving),
            Some((RobotMode::Idle, RobotMode::Moving))
        );
        assert_eq!(sm.transition(RobotMode::Moving), None);
        assert_eq!(
            sm.transition(RobotMode::ExecutingAction),
            Some((RobotMode::Moving, RobotMode::ExecutingAction))
        );
        assert_eq!(
            sm.transition(RobotMode::Idle),
            Some((RobotMode::ExecutingAction, RobotMode::Idle))
        );
        assert_eq!(sm.transition(RobotMode::Autonomous), None);
    }

    #[test]
    fn fault_ends_session_and_forces_idle() {
        let sm = RobotStateMachine::new();
        let session = sm.enable_autonomy().unwrap();
        assert_eq!(
            sm.force_idle(CancelReason::ActuatorFault),
            Some((RobotMode::Autonomous, RobotMode::Idle))
        );
        assert!(!sm.should_continue(session));
        assert_eq!(
            sm.session().cancel_reason,
            Some(CancelReason::ActuatorFault)
        );
    }

    #[test]
    fn mode_is_autonomous_iff_session_active() {
        let sm = RobotStateMachine::new();
        let check = |sm: &RobotStateMachine| {
            assert_eq!(sm.mode() == RobotMode::Autonomous, sm.session().active);
        };
        check(&sm);
        sm.enable_autonomy();
        check(&sm);
        sm.transition(RobotMode::Moving);
        check(&sm);
        let _ = sm.admit(Origin::Manual, Ok);
        check(&sm);
        sm.transition(RobotMode::Moving);
        check(&sm);
        sm.force_idle(CancelReason::ActuatorFault);
        check(&sm);
    }

    #[test]
    fn begin_phase_tracks_sequence_index() {
        let sm = RobotStateMachine::new();
        let session = sm.enable_autonomy().unwrap();
        sm.begin_phase(session, 2);
        assert_eq!(sm.session().sequence_index, 2);
        sm.begin_phase(session + 1, 3);
        assert_eq!(sm.session().sequence_index, 2);
    }
}
