//! In-process simulated hardware for tests and headless runs.
//!
//! [`SimDriver`] records every call it receives and models motion time with
//! the Tokio clock, so tests running with `start_paused` can reason about
//! timing deterministically.  [`SimSensor`] replays a scripted sequence of
//! readings and then settles on a default distance.
//!
//! # Fault injection
//!
//! | Knob | Effect |
//! |---|---|
//! | [`SimDriver::inject_fault`] | The next driver call fails with an actuator fault. |
//! | [`SimDriver::set_hang`] | Every call pends forever until cleared (exercises gateway timeouts). |
//! | [`SimSensor::then_fault`] | The scripted reading is a sensor fault. |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strider_hal::gateway::ActuatorGateway;
//! use strider_hal::sim::{DriverCall, SimDriver};
//! use strider_types::{Direction, Directive};
//!
//! # tokio_test_block(async {
//! let driver = Arc::new(SimDriver::new());
//! let mut gateway = ActuatorGateway::new(driver.clone(), Duration::from_secs(5));
//! gateway
//!     .dispatch(Directive { direction: Direction::Forward, speed: 95 })
//!     .await
//!     .unwrap();
//! assert_eq!(
//!     driver.calls(),
//!     vec![DriverCall::Action { name: "forward".into(), speed: 95 }]
//! );
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use strider_types::{HeadPose, StriderError};
use tokio::time::Instant;

use crate::driver::{DistanceSensor, LeggedDriver};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// SimDriver
// ────────────────────────────────────────────────────────────────────────────

/// One recorded driver invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Action { name: String, speed: u8 },
    LegsStop,
    HeadMove { pose: HeadPose, speed: u8 },
    WaitAllDone,
    Close,
}

/// Recording leg/head driver.  Every `do_action` keeps the driver busy for
/// `action_duration` of Tokio time.
#[derive(Debug, Default)]
pub struct SimDriver {
    calls: Mutex<Vec<DriverCall>>,
    busy_until: Mutex<Option<Instant>>,
    action_duration: Duration,
    pending_fault: Mutex<Option<String>>,
    hang: AtomicBool,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long each started motion keeps the driver busy.
    pub fn with_action_duration(mut self, duration: Duration) -> Self {
        self.action_duration = duration;
        self
    }

    /// Snapshot of every call received so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.calls).clone()
    }

    /// Only the `do_action` calls, as `(name, speed)` pairs.
    pub fn actions(&self) -> Vec<(String, u8)> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                DriverCall::Action { name, speed } => Some((name.clone(), *speed)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    /// Make the next call fail with `details`.
    pub fn inject_fault(&self, details: impl Into<String>) {
        *lock(&self.pending_fault) = Some(details.into());
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    async fn enter(&self, call: DriverCall) -> Result<(), StriderError> {
        lock(&self.calls).push(call);
        if let Some(details) = lock(&self.pending_fault).take() {
            return Err(StriderError::actuator("sim_driver", details));
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl LeggedDriver for SimDriver {
    async fn do_action(&self, name: &str, speed: u8) -> Result<(), StriderError> {
        self.enter(DriverCall::Action {
            name: name.to_string(),
            speed,
        })
        .await?;
        *lock(&self.busy_until) = Some(Instant::now() + self.action_duration);
        Ok(())
    }

    async fn legs_stop(&self) -> Result<(), StriderError> {
        self.enter(DriverCall::LegsStop).await?;
        *lock(&self.busy_until) = None;
        Ok(())
    }

    async fn head_move(&self, pose: HeadPose, speed: u8) -> Result<(), StriderError> {
        self.enter(DriverCall::HeadMove { pose, speed }).await
    }

    async fn wait_all_done(&self) -> Result<(), StriderError> {
        self.enter(DriverCall::WaitAllDone).await?;
        let deadline = *lock(&self.busy_until);
        if let Some(deadline) = deadline.filter(|d| *d > Instant::now()) {
            tokio::time::sleep_until(deadline).await;
        }
        Ok(())
    }

    fn is_all_done(&self) -> bool {
        lock(&self.busy_until).is_none_or(|deadline| Instant::now() >= deadline)
    }

    async fn close(&self) -> Result<(), StriderError> {
        self.enter(DriverCall::Close).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimSensor
// ────────────────────────────────────────────────────────────────────────────

/// Scripted distance sensor.
#[derive(Debug)]
pub struct SimSensor {
    script: Mutex<VecDeque<Result<f32, StriderError>>>,
    default_cm: Mutex<f32>,
}

impl SimSensor {
    /// Sensor that reads `default_cm` once its script is exhausted.
    pub fn new(default_cm: f32) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_cm: Mutex::new(default_cm),
        }
    }

    pub fn then_reading(self, cm: f32) -> Self {
        self.push_reading(cm);
        self
    }

    pub fn then_fault(self, details: impl Into<String>) -> Self {
        lock(&self.script).push_back(Err(StriderError::SensorFault(details.into())));
        self
    }

    pub fn push_reading(&self, cm: f32) {
        lock(&self.script).push_back(Ok(cm));
    }

    pub fn set_default(&self, cm: f32) {
        *lock(&self.default_cm) = cm;
    }
}

#[async_trait]
impl DistanceSensor for SimSensor {
    async fn read_distance(&self) -> Result<f32, StriderError> {
        match lock(&self.script).pop_front() {
            Some(reading) => reading,
            None => Ok(*lock(&self.default_cm)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn action_keeps_driver_busy_for_its_duration() {
        let driver = SimDriver::new().with_action_duration(Duration::from_millis(300));
        driver.do_action("sit", 70).await.unwrap();
        assert!(!driver.is_all_done());

        let started = Instant::now();
        driver.wait_all_done().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(driver.is_all_done());
    }

    #[tokio::test]
    async fn legs_stop_clears_motion() {
        let driver = SimDriver::new().with_action_duration(Duration::from_secs(60));
        driver.do_action("forward", 95).await.unwrap();
        driver.legs_stop().await.unwrap();
        assert!(driver.is_all_done());
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Action {
                    name: "forward".into(),
                    speed: 95
                },
                DriverCall::LegsStop
            ]
        );
    }

    #[tokio::test]
    async fn injected_fault_hits_exactly_one_call() {
        let driver = SimDriver::new();
        driver.inject_fault("servo stalled");
        assert!(matches!(
            driver.legs_stop().await,
            Err(StriderError::ActuatorFault { .. })
        ));
        assert!(driver.legs_stop().await.is_ok());
    }

    #[tokio::test]
    async fn sensor_replays_script_then_default() {
        let sensor = SimSensor::new(80.0).then_reading(18.0).then_fault("timeout");
        assert_eq!(sensor.read_distance().await, Ok(18.0));
        assert!(matches!(
            sensor.read_distance().await,
            Err(StriderError::SensorFault(_))
        ));
        assert_eq!(sensor.read_distance().await, Ok(80.0));
        sensor.set_default(12.0);
        assert_eq!(sensor.read_distance().await, Ok(12.0));
    }
}
