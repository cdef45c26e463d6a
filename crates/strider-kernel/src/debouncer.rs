//! [`CommandDebouncer`] – suppresses locomotion intents that are both too
//! soon and too similar to the last accepted one.
//!
//! A joystick front-end polls far faster than a legged gait can change, so
//! most samples are noise.  A `Move` intent is rejected only when **both**
//! hold:
//!
//! - less than `window` has elapsed since the last accepted move, and
//! - the Euclidean distance between its joystick vector and the last accepted
//!   vector is below `threshold`.
//!
//! Any other intent kind passes straight through and leaves the memory
//! untouched.  Polar payloads are compared via
//! [`MovePayload::as_vector`][strider_types::MovePayload::as_vector].
//!
//! The check and the memory update are split ([`would_accept`] /
//! [`record`]) so that a caller can commit only once the intent has really
//! been queued.
//!
//! [`would_accept`]: CommandDebouncer::would_accept
//! [`record`]: CommandDebouncer::record

use std::time::{Duration, Instant};

use strider_types::{ControlConfig, Intent, IntentPayload};

/// Last accepted joystick vector and its submission time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DebounceMemory {
    pub last_vector: (f32, f32),
    pub last_accepted_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct CommandDebouncer {
    window: Duration,
    threshold: f32,
    memory: DebounceMemory,
}

impl CommandDebouncer {
    pub fn new(window: Duration, threshold: f32) -> Self {
        Self {
            window,
            threshold,
            memory: DebounceMemory::default(),
        }
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Self::new(config.debounce(), config.movement_threshold)
    }

    pub fn memory(&self) -> &DebounceMemory {
        &self.memory
    }

    /// Whether `intent` would pass.  Does not touch the memory.
    pub fn would_accept(&self, intent: &Intent) -> bool {
        let IntentPayload::Move(payload) = intent.payload else {
            return true;
        };
        let Some(last_at) = self.memory.last_accepted_at else {
            return true;
        };

        let elapsed = intent.submitted_at.saturating_duration_since(last_at);
        let (x, y) = payload.as_vector();
        let (lx, ly) = self.memory.last_vector;
        let delta = (x - lx).hypot(y - ly);

        // NaN deltas count as significant.
        !(elapsed < self.window && delta < self.threshold)
    }

    /// Commit `intent` as the last accepted move.  Non-move intents are
    /// ignored.
    pub fn record(&mut self, intent: &Intent) {
        if let IntentPayload::Move(payload) = intent.payload {
            self.memory = DebounceMemory {
                last_vector: payload.as_vector(),
                last_accepted_at: Some(intent.submitted_at),
            };
        }
    }

    /// Check and, on success, commit in one step.
    #[cfg(test)]
    fn accept(&mut self, intent: &Intent) -> bool {
        let accepted = self.would_accept(intent);
        if accepted {
            self.record(intent);
        } else {
            tracing::trace!(kind = ?intent.kind(), "move debounced");
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_types::{ActionKind, MovePayload};

    fn debouncer() -> CommandDebouncer {
        CommandDebouncer::from_config(&ControlConfig::default())
    }

    fn move_at(x: f32, y: f32, at: Instant) -> Intent {
        let mut intent = Intent::manual(IntentPayload::Move(MovePayload::Vector { x, y }));
        intent.submitted_at = at;
        intent
    }

    #[test]
    fn first_move_is_always_accepted() {
        let mut d = debouncer();
        assert!(d.accept(&move_at(0.05, 0.05, Instant::now())));
        assert!(d.memory().last_accepted_at.is_some());
    }

    #[test]
    fn identical_move_inside_window_is_rejected() {
        let mut d = debouncer();
        let t0 = Instant::now();
        assert!(d.accept(&move_at(0.0, 0.8, t0)));
        assert!(!d.accept(&move_at(0.0, 0.8, t0 + Duration::from_millis(10))));
    }

    #[test]
    fn rejection_leaves_memory_untouched() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.accept(&move_at(0.0, 0.8, t0));
        let before = *d.memory();
        d.accept(&move_at(0.02, 0.8, t0 + Duration::from_millis(20)));
        assert_eq!(*d.memory(), before);
    }

    #[test]
    fn significant_change_inside_window_is_accepted() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.accept(&move_at(0.0, 0.8, t0));
        assert!(d.accept(&move_at(0.5, 0.8, t0 + Duration::from_millis(10))));
    }

    #[test]
    fn identical_move_after_window_is_accepted() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.accept(&move_at(0.0, 0.8, t0));
        assert!(d.accept(&move_at(0.0, 0.8, t0 + Duration::from_millis(50))));
    }

    #[test]
    fn polar_payload_compared_as_vector() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.accept(&move_at(0.0, 0.8, t0));
        let mut same = Intent::manual(IntentPayload::Move(MovePayload::Polar {
            angle_deg: 0.0,
            intensity: 0.8,
        }));
        same.submitted_at = t0 + Duration::from_millis(5);
        assert!(!d.would_accept(&same));
    }

    #[test]
    fn stop_and_action_bypass_without_recording() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.accept(&move_at(0.0, 0.8, t0));
        let before = *d.memory();

        let mut stop = Intent::manual(IntentPayload::Stop { emergency: false });
        stop.submitted_at = t0 + Duration::from_millis(1);
        let mut action = Intent::manual(IntentPayload::Action(ActionKind::Sit));
        action.submitted_at = t0 + Duration::from_millis(2);

        assert!(d.accept(&stop));
        assert!(d.accept(&action));
        assert!(d.accept(&stop));
        assert_eq!(*d.memory(), before);
    }

    #[test]
    fn would_accept_does_not_commit() {
        let d = debouncer();
        let intent = move_at(0.0, 0.8, Instant::now());
        assert!(d.would_accept(&intent));
        assert!(d.memory().last_accepted_at.is_none());
    }
}
