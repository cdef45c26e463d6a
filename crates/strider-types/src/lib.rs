//! `strider-types` – shared data model for the Strider control stack.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! the caller-submitted [`Intent`], the resolved [`Directive`], the coarse
//! [`RobotMode`], the fixed [`ActionKind`] enumeration, and the global
//! [`StriderError`].

pub mod config;

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use config::ControlConfig;

// ────────────────────────────────────────────────────────────────────────────
// Locomotion
// ────────────────────────────────────────────────────────────────────────────

/// Discrete locomotion direction understood by the leg driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
}

impl Direction {
    /// Gait name passed to the leg driver.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::TurnLeft => "turn_left",
            Direction::TurnRight => "turn_right",
            Direction::Stop => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actuator-ready output of the direction resolver.
///
/// `speed` is a driver percentage: `0` for [`Direction::Stop`], otherwise
/// within the configured `[min_speed, max_speed]` band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub direction: Direction,
    pub speed: u8,
}

impl Directive {
    pub const STOP: Directive = Directive {
        direction: Direction::Stop,
        speed: 0,
    };

    pub fn is_stop(&self) -> bool {
        self.direction == Direction::Stop
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}%", self.direction, self.speed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Canned actions
// ────────────────────────────────────────────────────────────────────────────

/// The fixed set of canned actions an operator (or the autonomous scheduler)
/// may request.  Names outside this set are rejected with
/// [`StriderError::UnknownAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Sit,
    StandUp,
    LieDown,
    WagTail,
    Stretch,
    ShakeHead,
    Bark,
    PushUp,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Sit,
        ActionKind::StandUp,
        ActionKind::LieDown,
        ActionKind::WagTail,
        ActionKind::Stretch,
        ActionKind::ShakeHead,
        ActionKind::Bark,
        ActionKind::PushUp,
    ];

    /// Public (wire) name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Sit => "sit",
            ActionKind::StandUp => "stand_up",
            ActionKind::LieDown => "lie_down",
            ActionKind::WagTail => "wag_tail",
            ActionKind::Stretch => "stretch",
            ActionKind::ShakeHead => "shake_head",
            ActionKind::Bark => "bark",
            ActionKind::PushUp => "push_up",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = StriderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| StriderError::UnknownAction(name.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Intents
// ────────────────────────────────────────────────────────────────────────────

/// A locomotion payload in either of the two accepted encodings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum MovePayload {
    /// Joystick vector, both components in `[-1, 1]`; `y` points forward.
    Vector { x: f32, y: f32 },
    /// Compass angle in degrees (0 = forward, 90 = right) and an intensity in
    /// `[0, 1]`.
    Polar { angle_deg: f32, intensity: f32 },
}

impl MovePayload {
    /// Equivalent joystick vector, used to compare payloads of either form.
    pub fn as_vector(&self) -> (f32, f32) {
        match *self {
            MovePayload::Vector { x, y } => (x, y),
            MovePayload::Polar {
                angle_deg,
                intensity,
            } => {
                let rad = angle_deg.to_radians();
                (intensity * rad.sin(), intensity * rad.cos())
            }
        }
    }
}

/// Head joystick position, both components in `[-100, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadVector {
    pub qx: f32,
    pub qy: f32,
}

impl HeadVector {
    pub const CENTER: HeadVector = HeadVector { qx: 0.0, qy: 0.0 };
}

/// Head orientation in degrees, as handed to the head driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw_deg: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
}

impl HeadPose {
    pub const CENTER: HeadPose = HeadPose {
        yaw_deg: 0.0,
        roll_deg: 0.0,
        pitch_deg: 0.0,
    };
}

/// Which producer created an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A human-facing endpoint (joystick, buttons, REPL).
    Manual,
    /// The autonomous scheduler running session `session`.
    Autonomous { session: u64 },
    /// The stop-and-recenter issued when autonomous session `session` ends.
    Cleanup { session: u64 },
}

impl Origin {
    pub fn is_manual(&self) -> bool {
        matches!(self, Origin::Manual)
    }
}

/// Intent discriminant, used for debouncing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Move,
    Head,
    Action,
    Stop,
}

/// Payload carried by an [`Intent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntentPayload {
    Move(MovePayload),
    Head(HeadVector),
    Action(ActionKind),
    /// `emergency` selects the gateway's emergency stop instead of a plain
    /// leg stop.
    Stop { emergency: bool },
}

/// An immutable request to move, turn the head, run an action, or stop.
///
/// Ownership passes from the producer into the arbiter queue and finally to
/// the worker, which discards it after dispatch.
#[derive(Debug, Clone)]
pub struct Intent {
    pub payload: IntentPayload,
    pub origin: Origin,
    pub submitted_at: Instant,
}

impl Intent {
    pub fn new(payload: IntentPayload, origin: Origin) -> Self {
        Self {
            payload,
            origin,
            submitted_at: Instant::now(),
        }
    }

    /// Convenience constructor for operator-originated intents.
    pub fn manual(payload: IntentPayload) -> Self {
        Self::new(payload, Origin::Manual)
    }

    pub fn kind(&self) -> IntentKind {
        match self.payload {
            IntentPayload::Move(_) => IntentKind::Move,
            IntentPayload::Head(_) => IntentKind::Head,
            IntentPayload::Action(_) => IntentKind::Action,
            IntentPayload::Stop { .. } => IntentKind::Stop,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot state
// ────────────────────────────────────────────────────────────────────────────

/// Coarse operating mode of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotMode {
    #[default]
    Idle,
    Moving,
    ExecutingAction,
    Autonomous,
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RobotMode::Idle => "idle",
            RobotMode::Moving => "moving",
            RobotMode::ExecutingAction => "executing_action",
            RobotMode::Autonomous => "autonomous",
        };
        f.write_str(s)
    }
}

/// Why an autonomous session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    ManualTakeover,
    Disabled,
    ActuatorFault,
    Shutdown,
}

// ────────────────────────────────────────────────────────────────────────────
// Boundary requests / replies
// ────────────────────────────────────────────────────────────────────────────

/// Raw locomotion request as received from a front-end.  Either the
/// `angle`/`intensity` pair or the `kx`/`ky` pair must be complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    #[serde(default)]
    pub kx: Option<f32>,
    #[serde(default)]
    pub ky: Option<f32>,
    #[serde(default)]
    pub angle: Option<f32>,
    #[serde(default)]
    pub intensity: Option<f32>,
}

impl MoveRequest {
    pub fn vector(kx: f32, ky: f32) -> Self {
        Self {
            kx: Some(kx),
            ky: Some(ky),
            ..Self::default()
        }
    }

    pub fn polar(angle: f32, intensity: f32) -> Self {
        Self {
            angle: Some(angle),
            intensity: Some(intensity),
            ..Self::default()
        }
    }
}

/// Result of an accepted locomotion submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MoveAck {
    /// Placed in the arbiter queue; carries the resolved directive.
    Queued { directive: Directive },
    /// Suppressed by the debouncer.  Not an error.
    Cached,
}

/// Read-only snapshot returned by `status()`.  Always available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub mode: RobotMode,
    pub autonomous_enabled: bool,
    pub queue_depth: usize,
    pub idle: bool,
    pub worker_healthy: bool,
}

/// Distance sensor passthrough.  `distance_cm` is `None` on sensor fault.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub distance_cm: Option<f32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"strider-runtime::arbiter"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    ModeChanged { from: RobotMode, to: RobotMode },
    AutonomyChanged { enabled: bool },
    Dispatched { intent: IntentKind, detail: String },
    IntentDropped { intent: IntentKind, reason: String },
    ActuatorFault { component: String, details: String },
    ObstacleDetected { distance_cm: f32 },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type spanning caller mistakes, back-pressure, and hardware
/// faults.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StriderError {
    #[error("Invalid intent: {0}")]
    InvalidIntentKind(String),

    #[error("Command queue full, try again")]
    QueueFull,

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Actuator fault on {component}: {details}")]
    ActuatorFault { component: String, details: String },

    #[error("Sensor fault: {0}")]
    SensorFault(String),

    /// An autonomous intent arrived after its session was cancelled.
    #[error("Intent preempted: {0}")]
    Preempted(String),

    #[error("Event bus channel error: {0}")]
    Channel(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl StriderError {
    /// Stable machine-readable kind, used in structured replies.
    pub fn kind(&self) -> &'static str {
        match self {
            StriderError::InvalidIntentKind(_) => "invalid_intent_kind",
            StriderError::QueueFull => "queue_full",
            StriderError::UnknownAction(_) => "unknown_action",
            StriderError::ActuatorFault { .. } => "actuator_fault",
            StriderError::SensorFault(_) => "sensor_fault",
            StriderError::Preempted(_) => "preempted",
            StriderError::Channel(_) => "channel",
            StriderError::Transport(_) => "transport",
        }
    }

    pub fn actuator(component: impl Into<String>, details: impl Into<String>) -> Self {
        StriderError::ActuatorFault {
            component: component.into(),
            details: details.into(),
        }
    }
}
