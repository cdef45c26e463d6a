//! [`DirectionResolver`] – maps joystick input onto a discrete [`Directive`].
//!
//! Two decoders feed the same output type:
//!
//! | Input form | Deadzone test | Sector anchors |
//! |---|---|---|
//! | `{kx, ky}` vector | `hypot(kx, ky) < deadzone` | bearing 90° forward, 0° turn right, 180° turn left, 270° backward |
//! | `{angle, intensity}` | `intensity < deadzone` | compass 0° forward, 90° turn right, 180° backward, 270° turn left |
//!
//! Both forms share one deadzone (default `0.35`) and one speed law:
//! `min_speed + (max_speed - min_speed) * min(magnitude, 1.0)`, truncated to
//! an integer percentage and never below `min_speed` for a moving directive.
//!
//! # Example
//!
//! ```
//! use strider_kernel::resolver::DirectionResolver;
//! use strider_types::{ControlConfig, Direction};
//!
//! let resolver = DirectionResolver::from_config(&ControlConfig::default());
//! let directive = resolver.resolve_vector(0.0, 0.8);
//! assert_eq!(directive.direction, Direction::Forward);
//! assert_eq!(directive.speed, 95);
//!
//! assert!(resolver.resolve_vector(0.05, 0.05).is_stop());
//! ```

use strider_types::{
    ControlConfig, Direction, Directive, HeadPose, HeadVector, MovePayload, MoveRequest,
    StriderError,
};

/// Maximum head yaw (degrees) at `qx = ±100`.
pub const HEAD_YAW_RANGE_DEG: f32 = 90.0;
/// Maximum head pitch (degrees) at `qy = ±100`.
pub const HEAD_PITCH_RANGE_DEG: f32 = 30.0;
/// Head joystick values within this band re-centre the head.
pub const HEAD_DEADZONE: f32 = 5.0;

/// Pure, stateless direction resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionResolver {
    deadzone: f32,
    min_speed: u8,
    max_speed: u8,
}

impl DirectionResolver {
    pub fn new(deadzone: f32, min_speed: u8, max_speed: u8) -> Self {
        Self {
            deadzone,
            min_speed: min_speed.min(max_speed),
            max_speed: max_speed.max(min_speed),
        }
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Self::new(config.deadzone, config.min_speed, config.max_speed)
    }

    /// Resolve either payload form.
    pub fn resolve(&self, payload: &MovePayload) -> Directive {
        match *payload {
            MovePayload::Vector { x, y } => self.resolve_vector(x, y),
            MovePayload::Polar {
                angle_deg,
                intensity,
            } => self.resolve_polar(angle_deg, intensity),
        }
    }

    /// Resolve a joystick vector.
    ///
    /// Bucketing by the dominant axis is the same as bucketing the bearing
    /// into 90° sectors centred on the axes; on an exact diagonal the
    /// horizontal axis wins, so the robot turns rather than walks.
    pub fn resolve_vector(&self, x: f32, y: f32) -> Directive {
        let magnitude = x.hypot(y);
        // `!(a >= b)` also routes NaN to stop.
        if !(magnitude >= self.deadzone) || magnitude == 0.0 {
            return Directive::STOP;
        }

        let direction = if y.abs() > x.abs() {
            if y > 0.0 {
                Direction::Forward
            } else {
                Direction::Backward
            }
        } else if x > 0.0 {
            Direction::TurnRight
        } else {
            Direction::TurnLeft
        };

        Directive {
            direction,
            speed: self.speed_for(magnitude),
        }
    }

    /// Resolve a compass angle / intensity pair.  Sectors are half-open,
    /// `[centre - 45°, centre + 45°)`.
    pub fn resolve_polar(&self, angle_deg: f32, intensity: f32) -> Directive {
        if !(intensity >= self.deadzone) || !angle_deg.is_finite() {
            return Directive::STOP;
        }

        let angle = angle_deg.rem_euclid(360.0);
        let direction = if !(45.0..315.0).contains(&angle) {
            Direction::Forward
        } else if angle < 135.0 {
            Direction::TurnRight
        } else if angle < 225.0 {
            Direction::Backward
        } else {
            Direction::TurnLeft
        };

        Directive {
            direction,
            speed: self.speed_for(intensity),
        }
    }

    fn speed_for(&self, magnitude: f32) -> u8 {
        let span = f32::from(self.max_speed - self.min_speed);
        let raw = f32::from(self.min_speed) + span * magnitude.clamp(0.0, 1.0);
        // Truncation towards zero, then floored to the configured minimum.
        (raw as u8).clamp(self.min_speed, self.max_speed)
    }
}

/// Pick the payload form present in `request`.
///
/// The angle/intensity pair takes precedence when both pairs are complete.
///
/// # Errors
///
/// [`StriderError::InvalidIntentKind`] when neither pair is fully populated.
pub fn decode_move(request: &MoveRequest) -> Result<MovePayload, StriderError> {
    match *request {
        MoveRequest {
            angle: Some(angle_deg),
            intensity: Some(intensity),
            ..
        } => Ok(MovePayload::Polar {
            angle_deg,
            intensity,
        }),
        MoveRequest {
            kx: Some(x),
            ky: Some(y),
            ..
        } => Ok(MovePayload::Vector { x, y }),
        _ => Err(StriderError::InvalidIntentKind(
            "expected either {angle, intensity} or {kx, ky}".to_string(),
        )),
    }
}

/// Map a head joystick position onto yaw/pitch angles.
pub fn head_pose(head: HeadVector) -> HeadPose {
    if head.qx.abs() <= HEAD_DEADZONE && head.qy.abs() <= HEAD_DEADZONE {
        return HeadPose::CENTER;
    }
    HeadPose {
        yaw_deg: head.qx / 100.0 * HEAD_YAW_RANGE_DEG,
        roll_deg: 0.0,
        pitch_deg: head.qy / 100.0 * HEAD_PITCH_RANGE_DEG,
    }
}
