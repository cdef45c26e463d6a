//! Driver boundary traits.
//!
//! The control stack never talks to servos directly.  A hardware back-end
//! implements [`LeggedDriver`] (legs, head, canned actions) and
//! [`DistanceSensor`] (ultrasonic range finder); everything above the
//! [`ActuatorGateway`][crate::gateway::ActuatorGateway] only sees these
//! traits, so the simulated back-end in [`sim`][crate::sim] and a real one
//! are interchangeable.
//!
//! Driver calls are `async` so the gateway can bound each of them with
//! `tokio::time::timeout`.  Implementations must not assume they are called
//! concurrently: the gateway guarantees one outstanding call at a time.

use std::time::Duration;

use async_trait::async_trait;
use strider_types::{HeadPose, SensorSnapshot, StriderError};
use tracing::warn;

/// Legs, head, and canned-action driver of a quadruped.
#[async_trait]
pub trait LeggedDriver: Send + Sync {
    /// Start a named gait (`"forward"`, `"turn_left"`, …) or canned action
    /// (`"sit"`, `"bark"`, …).  Returns once the command is accepted; the
    /// motion itself may still be running.
    async fn do_action(&self, name: &str, speed: u8) -> Result<(), StriderError>;

    /// Halt the leg gait.
    async fn legs_stop(&self) -> Result<(), StriderError>;

    /// Point the head.  `speed` is a percentage like every other call.
    async fn head_move(&self, pose: HeadPose, speed: u8) -> Result<(), StriderError>;

    /// Resolve once every queued motion has finished.
    async fn wait_all_done(&self) -> Result<(), StriderError>;

    /// Non-blocking: `true` when no motion is running.
    fn is_all_done(&self) -> bool;

    /// Release the hardware.  Called once at shutdown.
    async fn close(&self) -> Result<(), StriderError> {
        Ok(())
    }
}

/// Forward-facing range finder.
#[async_trait]
pub trait DistanceSensor: Send + Sync {
    /// Distance to the nearest obstacle in centimetres.  Negative or
    /// non-finite values mean "no echo".
    async fn read_distance(&self) -> Result<f32, StriderError>;
}

/// Read `sensor` once, bounded by `timeout`.
///
/// Any failure (error, timeout, negative or non-finite reading) yields
/// `distance_cm: None` and a `warn!` line; it never propagates.
pub async fn read_snapshot(sensor: &dyn DistanceSensor, timeout: Duration) -> SensorSnapshot {
    let distance_cm = match tokio::time::timeout(timeout, sensor.read_distance()).await {
        Ok(Ok(cm)) if cm.is_finite() && cm >= 0.0 => Some(cm),
        Ok(Ok(cm)) => {
            warn!(reading = cm, "distance sensor returned no echo");
            None
        }
        Ok(Err(err)) => {
            warn!(%err, "distance sensor read failed");
            None
        }
        Err(_) => {
            warn!(?timeout, "distance sensor read timed out");
            None
        }
    };
    SensorSnapshot { distance_cm }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSensor;

    #[tokio::test]
    async fn snapshot_passes_valid_reading() {
        let sensor = SimSensor::new(42.0);
        let snap = read_snapshot(&sensor, Duration::from_secs(1)).await;
        assert_eq!(snap.distance_cm, Some(42.0));
    }

    #[tokio::test]
    async fn snapshot_maps_fault_and_no_echo_to_none() {
        let sensor = SimSensor::new(42.0).then_fault("i2c nack").then_reading(-1.0);
        assert_eq!(
            read_snapshot(&sensor, Duration::from_secs(1)).await.distance_cm,
            None
        );
        assert_eq!(
            read_snapshot(&sensor, Duration::from_secs(1)).await.distance_cm,
            None
        );
        assert_eq!(
            read_snapshot(&sensor, Duration::from_secs(1)).await.distance_cm,
            Some(42.0)
        );
    }
}
