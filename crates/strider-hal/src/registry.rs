//! Canned-action registry.
//!
//! Every [`ActionKind`] maps to a pure [`ActionDescriptor`]: the name the
//! driver knows the action by and the speed it is played at unless the
//! caller overrides it.
//!
//! | Action | Driver action | Default speed |
//! |---|---|---|
//! | `sit` | `sit` | 70 |
//! | `stand_up` | `stand` | 70 |
//! | `lie_down` | `lie` | 70 |
//! | `wag_tail` | `wag_tail` | 100 |
//! | `stretch` | `stretch` | 80 |
//! | `shake_head` | `shake_head` | 80 |
//! | `bark` | `bark` | 100 |
//! | `push_up` | `push_up` | 92 |

use strider_types::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub driver_action: &'static str,
    pub default_speed: u8,
}

impl ActionDescriptor {
    pub const fn of(kind: ActionKind) -> Self {
        let (driver_action, default_speed) = match kind {
            ActionKind::Sit => ("sit", 70),
            ActionKind::StandUp => ("stand", 70),
            ActionKind::LieDown => ("lie", 70),
            ActionKind::WagTail => ("wag_tail", 100),
            ActionKind::Stretch => ("stretch", 80),
            ActionKind::ShakeHead => ("shake_head", 80),
            ActionKind::Bark => ("bark", 100),
            ActionKind::PushUp => ("push_up", 92),
        };
        Self {
            kind,
            driver_action,
            default_speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_has_a_descriptor() {
        let descriptors: Vec<_> = ActionKind::ALL.into_iter().map(ActionDescriptor::of).collect();
        assert_eq!(descriptors.len(), ActionKind::ALL.len());
        for d in descriptors {
            assert!(!d.driver_action.is_empty());
            assert!(d.default_speed > 0 && d.default_speed <= 100);
        }
    }

    #[test]
    fn posture_actions_use_driver_names() {
        assert_eq!(ActionDescriptor::of(ActionKind::StandUp).driver_action, "stand");
        assert_eq!(ActionDescriptor::of(ActionKind::LieDown).driver_action, "lie");
        assert_eq!(ActionDescriptor::of(ActionKind::Bark).default_speed, 100);
    }
}
