//! [`ActuatorGateway`] – sole owner of the leg/head driver.
//!
//! Every mutating operation takes `&mut self`, so a single owner (the
//! arbiter worker) can never have two driver invocations outstanding.  Each
//! driver call is bounded by the configured actuator timeout; an expired or
//! failed call surfaces as [`StriderError::ActuatorFault`].
//!
//! # Operations
//!
//! | Operation | Driver calls |
//! |---|---|
//! | [`dispatch`][ActuatorGateway::dispatch] (moving) | `legs_stop` + `wait_all_done` when changing gait, then `do_action(gait, speed)` |
//! | [`dispatch`][ActuatorGateway::dispatch] (stop) | `legs_stop` + `wait_all_done` |
//! | [`run_action`][ActuatorGateway::run_action] | `legs_stop` if walking, `do_action(name, speed)`, `wait_all_done` |
//! | [`move_head`][ActuatorGateway::move_head] | `head_move(pose, 100)` |
//! | [`emergency_stop`][ActuatorGateway::emergency_stop] | `legs_stop`, `head_move(center)`; both attempted |
//!
//! [`query_idle`][ActuatorGateway::query_idle] and the detachable
//! [`IdleProbe`] never block.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use strider_types::{ActionKind, Direction, Directive, HeadPose, StriderError};
use tracing::{debug, warn};

use crate::driver::LeggedDriver;
use crate::registry::ActionDescriptor;

/// Head servo speed used for joystick-driven head motion.
const HEAD_SPEED: u8 = 100;

/// Clears the in-flight flag on every exit path, including cancellation.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn enter(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Arc::clone(flag))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cheap, cloneable, non-blocking view of whether the actuator is idle.
#[derive(Clone)]
pub struct IdleProbe {
    in_flight: Arc<AtomicBool>,
    driver: Arc<dyn LeggedDriver>,
}

impl IdleProbe {
    /// `true` when no gateway call is outstanding and the driver reports all
    /// motion finished.
    pub fn is_idle(&self) -> bool {
        !self.in_flight.load(Ordering::SeqCst) && self.driver.is_all_done()
    }
}

pub struct ActuatorGateway {
    driver: Arc<dyn LeggedDriver>,
    timeout: Duration,
    current_gait: Direction,
    in_flight: Arc<AtomicBool>,
}

impl ActuatorGateway {
    pub fn new(driver: Arc<dyn LeggedDriver>, timeout: Duration) -> Self {
        Self {
            driver,
            timeout,
            current_gait: Direction::Stop,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn idle_probe(&self) -> IdleProbe {
        IdleProbe {
            in_flight: Arc::clone(&self.in_flight),
            driver: Arc::clone(&self.driver),
        }
    }

    pub fn query_idle(&self) -> bool {
        self.idle_probe().is_idle()
    }

    /// Gait the legs were last told to walk; `Stop` when standing.
    pub fn current_gait(&self) -> Direction {
        self.current_gait
    }

    async fn bounded(
        &self,
        component: &str,
        call: impl Future<Output = Result<(), StriderError>>,
    ) -> Result<(), StriderError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err @ StriderError::ActuatorFault { .. })) => Err(err),
            Ok(Err(other)) => Err(StriderError::actuator(component, other.to_string())),
            Err(_) => Err(StriderError::actuator(
                component,
                format!("no response within {:?}", self.timeout),
            )),
        }
    }

    async fn halt_legs(&mut self) -> Result<(), StriderError> {
        // Forget the gait first: after a failed stop the legs are in an
        // unknown state and the next dispatch must not skip its own stop.
        self.current_gait = Direction::Stop;
        self.bounded("legs", self.driver.legs_stop()).await?;
        self.bounded("legs", self.driver.wait_all_done()).await
    }

    /// Drive the legs according to `directive`.  Stopping is idempotent.
    pub async fn dispatch(&mut self, directive: Directive) -> Result<(), StriderError> {
        let _guard = InFlight::enter(&self.in_flight);

        if directive.is_stop() {
            debug!("gateway: legs stop");
            return self.halt_legs().await;
        }

        if self.current_gait != Direction::Stop && self.current_gait != directive.direction {
            debug!(from = %self.current_gait, to = %directive.direction, "gateway: changing gait");
            self.halt_legs().await?;
        }

        debug!(%directive, "gateway: walk");
        self.bounded(
            "legs",
            self.driver
                .do_action(directive.direction.as_str(), directive.speed),
        )
        .await?;
        self.current_gait = directive.direction;
        Ok(())
    }

    /// Play a canned action to completion.  `speed` overrides the
    /// registry default.
    pub async fn run_action(
        &mut self,
        kind: ActionKind,
        speed: Option<u8>,
    ) -> Result<(), StriderError> {
        let _guard = InFlight::enter(&self.in_flight);
        let descriptor = ActionDescriptor::of(kind);
        let speed = speed.unwrap_or(descriptor.default_speed);

        if self.current_gait != Direction::Stop {
            self.halt_legs().await?;
        }

        debug!(action = descriptor.driver_action, speed, "gateway: action");
        let component = descriptor.driver_action;
        self.bounded(component, self.driver.do_action(component, speed))
            .await?;
        self.bounded(component, self.driver.wait_all_done()).await
    }

    pub async fn move_head(&mut self, pose: HeadPose) -> Result<(), StriderError> {
        let _guard = InFlight::enter(&self.in_flight);
        debug!(yaw = pose.yaw_deg, pitch = pose.pitch_deg, "gateway: head");
        self.bounded("head", self.driver.head_move(pose, HEAD_SPEED))
            .await
    }

    /// Halt the legs and recenter the head.  Both steps are attempted even
    /// if the first fails; the first error is returned.
    pub async fn emergency_stop(&mut self) -> Result<(), StriderError> {
        let _guard = InFlight::enter(&self.in_flight);
        self.current_gait = Direction::Stop;

        let legs = self.bounded("legs", self.driver.legs_stop()).await;
        if let Err(err) = &legs {
            warn!(%err, "emergency stop: legs did not acknowledge");
        }
        let head = self
            .bounded("head", self.driver.head_move(HeadPose::CENTER, HEAD_SPEED))
            .await;
        if let Err(err) = &head {
            warn!(%err, "emergency stop: head did not recenter");
        }
        legs.and(head)
    }

    /// Release the driver.  The gateway is consumed.
    pub async fn close(self) -> Result<(), StriderError> {
        self.bounded("driver", self.driver.close()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{DriverCall, SimDriver};

    fn gateway(driver: &Arc<SimDriver>) -> ActuatorGateway {
        ActuatorGateway::new(driver.clone(), Duration::from_secs(5))
    }

    fn walk(direction: Direction, speed: u8) -> Directive {
        Directive { direction, speed }
    }

    #[tokio::test]
    async fn dispatch_forward_starts_gait() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = gateway(&driver);
        gw.dispatch(walk(Direction::Forward, 95)).await.unwrap();
        assert_eq!(driver.actions(), vec![("forward".to_string(), 95)]);
        assert_eq!(gw.current_gait(), Direction::Forward);
    }

    #[tokio::test]
    async fn changing_gait_stops_legs_first() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = gateway(&driver);
        gw.dispatch(walk(Direction::Forward, 95)).await.unwrap();
        driver.clear();
        gw.dispatch(walk(Direction::TurnLeft, 90)).await.unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::LegsStop,
                DriverCall::WaitAllDone,
                DriverCall::Action {
                    name: "turn_left".into(),
                    speed: 90
                },
            ]
        );
    }

    #[tokio::test]
    async fn same_gait_does_not_stop_legs() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = gateway(&driver);
        gw.dispatch(walk(Direction::Forward, 95)).await.unwrap();
        gw.dispatch(walk(Direction::Forward, 98)).await.unwrap();
        assert!(!driver.calls().contains(&DriverCall::LegsStop));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = gateway(&driver);
        gw.dispatch(Directive::STOP).await.unwrap();
        gw.dispatch(Directive::STOP).await.unwrap();
        assert_eq!(gw.current_gait(), Direction::Stop);
        assert!(driver.actions().is_empty());
    }

    #[tokio::test]
    async fn action_uses_registry_defaults() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = gateway(&driver);
        gw.run_action(ActionKind::StandUp, None).await.unwrap();
        gw.run_action(ActionKind::Bark, Some(60)).await.unwrap();
        assert_eq!(
            driver.actions(),
            vec![("stand".to_string(), 70), ("bark".to_string(), 60)]
        );
    }

    #[tokio::test]
    async fn driver_fault_is_reported() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = gateway(&driver);
        driver.inject_fault("servo stalled");
        let err = gw.dispatch(walk(Direction::Forward, 95)).await.unwrap_err();
        assert!(matches!(err, StriderError::ActuatorFault { .. }));
        assert_eq!(gw.current_gait(), Direction::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_driver_times_out() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = ActuatorGateway::new(driver.clone(), Duration::from_millis(500));
        driver.set_hang(true);
        let err = gw.move_head(HeadPose::CENTER).await.unwrap_err();
        assert!(
            matches!(err, StriderError::ActuatorFault { ref component, .. } if component == "head")
        );
        assert!(gw.query_idle());
    }

    #[tokio::test]
    async fn emergency_stop_attempts_both_steps() {
        let driver = Arc::new(SimDriver::new());
        let mut gw = gateway(&driver);
        driver.inject_fault("legs jammed");
        assert!(gw.emergency_stop().await.is_err());
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::LegsStop,
                DriverCall::HeadMove {
                    pose: HeadPose::CENTER,
                    speed: 100
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_probe_tracks_driver_motion() {
        let driver = Arc::new(SimDriver::new().with_action_duration(Duration::from_secs(1)));
        let mut gw = gateway(&driver);
        let probe = gw.idle_probe();
        assert!(probe.is_idle());
        gw.dispatch(walk(Direction::Forward, 95)).await.unwrap();
        assert!(!probe.is_idle());
        gw.dispatch(Directive::STOP).await.unwrap();
        assert!(probe.is_idle());
    }
}
