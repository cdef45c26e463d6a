//! Tuning knobs for the arbitration core.
//!
//! Every field has a serde default so partial `[control]` tables in the CLI
//! config file are accepted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Driver calls in the slowest intent: legs stop, wait, action, wait.
const WORST_CASE_DRIVER_CALLS: u32 = 4;

/// Resolver, debouncer, queue, gateway, and autonomy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Joystick magnitude (or intensity) below which a move resolves to stop.
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,
    #[serde(default = "default_min_speed")]
    pub min_speed: u8,
    #[serde(default = "default_max_speed")]
    pub max_speed: u8,

    /// Minimum spacing between two similar accepted moves.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Euclidean joystick change considered significant.
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,

    /// Arbiter queue capacity (clamped to 3..=10).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long the worker waits on an empty queue before re-checking for
    /// shutdown.
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
    /// Upper bound on any single driver call, including waiting for an action
    /// to finish.
    #[serde(default = "default_actuator_timeout_ms")]
    pub actuator_timeout_ms: u64,
    /// Heartbeat deadline for the arbiter worker.  Raised to
    /// [`ControlConfig::worker_heartbeat`]'s floor when set lower.
    #[serde(default = "default_worker_heartbeat_ms")]
    pub worker_heartbeat_ms: u64,

    /// Cancellation poll interval of the autonomous scheduler.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on a single distance-sensor read.
    #[serde(default = "default_sensor_timeout_ms")]
    pub sensor_timeout_ms: u64,
    #[serde(default = "default_obstacle_threshold_cm")]
    pub obstacle_threshold_cm: f32,
    #[serde(default = "default_vocalize_ms")]
    pub vocalize_ms: u64,
    #[serde(default = "default_patrol_ms")]
    pub patrol_ms: u64,
    #[serde(default = "default_patrol_cycle_ms")]
    pub patrol_cycle_ms: u64,
    #[serde(default = "default_avoid_turn_ms")]
    pub avoid_turn_ms: u64,
    #[serde(default = "default_rest_ms")]
    pub rest_ms: u64,
}

fn default_deadzone() -> f32 {
    0.35
}
fn default_min_speed() -> u8 {
    85
}
fn default_max_speed() -> u8 {
    98
}
fn default_debounce_ms() -> u64 {
    50
}
fn default_movement_threshold() -> f32 {
    0.1
}
fn default_queue_capacity() -> usize {
    8
}
fn default_dequeue_timeout_ms() -> u64 {
    1_000
}
fn default_actuator_timeout_ms() -> u64 {
    5_000
}
fn default_worker_heartbeat_ms() -> u64 {
    21_000
}
fn default_poll_interval_ms() -> u64 {
    200
}
fn default_sensor_timeout_ms() -> u64 {
    500
}
fn default_obstacle_threshold_cm() -> f32 {
    25.0
}
fn default_vocalize_ms() -> u64 {
    3_000
}
fn default_patrol_ms() -> u64 {
    10_000
}
fn default_patrol_cycle_ms() -> u64 {
    500
}
fn default_avoid_turn_ms() -> u64 {
    1_500
}
fn default_rest_ms() -> u64 {
    5_000
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            deadzone: default_deadzone(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
            debounce_ms: default_debounce_ms(),
            movement_threshold: default_movement_threshold(),
            queue_capacity: default_queue_capacity(),
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
            actuator_timeout_ms: default_actuator_timeout_ms(),
            worker_heartbeat_ms: default_worker_heartbeat_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            sensor_timeout_ms: default_sensor_timeout_ms(),
            obstacle_threshold_cm: default_obstacle_threshold_cm(),
            vocalize_ms: default_vocalize_ms(),
            patrol_ms: default_patrol_ms(),
            patrol_cycle_ms: default_patrol_cycle_ms(),
            avoid_turn_ms: default_avoid_turn_ms(),
            rest_ms: default_rest_ms(),
        }
    }
}

impl ControlConfig {
    pub const MIN_QUEUE_CAPACITY: usize = 3;
    pub const MAX_QUEUE_CAPACITY: usize = 10;

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .clamp(Self::MIN_QUEUE_CAPACITY, Self::MAX_QUEUE_CAPACITY)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn actuator_timeout(&self) -> Duration {
        Duration::from_millis(self.actuator_timeout_ms)
    }

    /// Effective heartbeat deadline of the worker.  The worker only beats
    /// between intents, and the longest intent (an action that first halts a
    /// gait) makes four bounded driver calls, so the deadline never drops
    /// below that plus one idle dequeue wait.
    pub fn worker_heartbeat(&self) -> Duration {
        let floor = self.actuator_timeout() * WORST_CASE_DRIVER_CALLS + self.dequeue_timeout();
        Duration::from_millis(self.worker_heartbeat_ms).max(floor)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would turn the scheduler's sliced sleeps into a
        // busy loop.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    /// Worst-case time between an autonomous session being cancelled and its
    /// scheduler noticing: one sliced sleep or one sensor read.
    pub fn max_cancel_latency(&self) -> Duration {
        self.poll_interval() + self.sensor_timeout()
    }

    pub fn vocalize(&self) -> Duration {
        Duration::from_millis(self.vocalize_ms)
    }

    pub fn patrol(&self) -> Duration {
        Duration::from_millis(self.patrol_ms)
    }

    pub fn patrol_cycle(&self) -> Duration {
        Duration::from_millis(self.patrol_cycle_ms)
    }

    pub fn avoid_turn(&self) -> Duration {
        Duration::from_millis(self.avoid_turn_ms)
    }

    pub fn rest(&self) -> Duration {
        Duration::from_millis(self.rest_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = ControlConfig::default();
        assert!((cfg.deadzone - 0.35).abs() < f32::EPSILON);
        assert_eq!((cfg.min_speed, cfg.max_speed), (85, 98));
        assert_eq!(cfg.debounce(), Duration::from_millis(50));
        assert!((cfg.obstacle_threshold_cm - 25.0).abs() < f32::EPSILON);
    }

    #[test]
    fn queue_capacity_is_clamped() {
        let mut cfg = ControlConfig::default();
        cfg.queue_capacity = 1;
        assert_eq!(cfg.queue_capacity(), 3);
        cfg.queue_capacity = 64;
        assert_eq!(cfg.queue_capacity(), 10);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: ControlConfig = serde_json::from_str(r#"{"queue_capacity":4}"#).unwrap();
        assert_eq!(cfg.queue_capacity, 4);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(200));
    }

    #[test]
    fn cancel_latency_is_poll_plus_sensor_read() {
        let cfg = ControlConfig::default();
        assert_eq!(cfg.max_cancel_latency(), Duration::from_millis(700));
    }

    #[test]
    fn worker_heartbeat_covers_slowest_intent() {
        let mut cfg = ControlConfig::default();
        assert_eq!(cfg.worker_heartbeat(), Duration::from_secs(21));

        cfg.worker_heartbeat_ms = 3_000;
        assert_eq!(cfg.worker_heartbeat(), Duration::from_secs(21));

        cfg.actuator_timeout_ms = 100;
        assert_eq!(cfg.worker_heartbeat(), Duration::from_secs(3));
    }
}
