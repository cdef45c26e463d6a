//! [`RobotService`] – the owned entry point front-ends talk to.
//!
//! The service owns every piece of shared state: the debouncer, the state
//! machine, the arbiter queue and worker, the autonomous scheduler task, and
//! the watchdog.  [`RobotService`] itself is a cheap `Clone` handle; hand a
//! copy to each front-end.
//!
//! Every `submit_*` call is non-blocking.  It validates the request, passes
//! it through the state machine's admission gate and enqueues it, or reports
//! why it could not:
//!
//! | Result | Meaning |
//! |---|---|
//! | `Ok(MoveAck::Queued)` / `Ok(..)` | The intent is in the queue. |
//! | `Ok(MoveAck::Cached)` | Debounced; nothing was queued. |
//! | `Err(QueueFull)` | Busy; retry later.  Debounce memory is unchanged. |
//! | `Err(InvalidIntentKind / UnknownAction)` | Rejected before queueing. |
//!
//! Any manual submission made while autonomy is on cancels the session and
//! queues its stop-and-recenter ahead of itself, even when the submission is
//! then debounced or rejected as busy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use strider_hal::{
    ActuatorGateway, DistanceSensor, IdleProbe, LeggedDriver, read_snapshot,
};
use strider_kernel::{
    Admission, CommandDebouncer, ComponentHealth, DirectionResolver, IntentValidator,
    RobotStateMachine, Watchdog, decode_move,
};
use strider_middleware::{EventBus, Topic};
use strider_types::{
    ActionKind, CancelReason, ControlConfig, Event, EventPayload, HeadVector, Intent,
    IntentPayload, MoveAck, MovePayload, MoveRequest, Origin, RobotMode, SensorSnapshot,
    StatusSnapshot, StriderError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::arbiter::{self, ArbiterHandle, ArbiterWorker, WORKER_COMPONENT};
use crate::autonomy::AutonomyScheduler;

const SOURCE: &str = "strider-runtime::service";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

pub struct RobotServiceBuilder {
    driver: Arc<dyn LeggedDriver>,
    sensor: Arc<dyn DistanceSensor>,
    config: ControlConfig,
    bus: Option<EventBus>,
    validator: Option<IntentValidator>,
    seed: Option<u64>,
}

impl RobotServiceBuilder {
    pub fn with_config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing bus instead of creating one.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replace the default range rules.
    pub fn with_validator(mut self, validator: IntentValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Seed the autonomous routine's random choices.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Spawn the arbiter worker and return the running service.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> RobotService {
        let config = self.config;
        let bus = self.bus.unwrap_or_default();
        let state = Arc::new(RobotStateMachine::new());
        let watchdog = Arc::new(Watchdog::new());
        let resolver = DirectionResolver::from_config(&config);

        let gateway = ActuatorGateway::new(self.driver, config.actuator_timeout());
        let idle = gateway.idle_probe();
        let (arbiter, rx) = arbiter::channel(config.queue_capacity());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = ArbiterWorker::new(
            rx,
            gateway,
            resolver,
            Arc::clone(&state),
            bus.clone(),
            Arc::clone(&watchdog),
            config.dequeue_timeout(),
            config.worker_heartbeat(),
            shutdown_rx,
        );
        let worker = tokio::spawn(worker.run());
        info!(
            queue_capacity = arbiter.capacity(),
            "robot service started"
        );

        RobotService {
            inner: Arc::new(Inner {
                debouncer: Mutex::new(CommandDebouncer::from_config(&config)),
                validator: self
                    .validator
                    .unwrap_or_else(IntentValidator::with_default_rules),
                resolver,
                state,
                arbiter,
                idle,
                sensor: self.sensor,
                bus,
                watchdog,
                shutdown: shutdown_tx,
                worker: Mutex::new(Some(worker)),
                scheduler: Mutex::new(None),
                seed: self.seed,
                config,
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Service
// ────────────────────────────────────────────────────────────────────────────

struct Inner {
    config: ControlConfig,
    resolver: DirectionResolver,
    validator: IntentValidator,
    debouncer: Mutex<CommandDebouncer>,
    state: Arc<RobotStateMachine>,
    arbiter: ArbiterHandle,
    idle: IdleProbe,
    sensor: Arc<dyn DistanceSensor>,
    bus: EventBus,
    watchdog: Arc<Watchdog>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<ActuatorGateway>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    seed: Option<u64>,
}

#[derive(Clone)]
pub struct RobotService {
    inner: Arc<Inner>,
}

impl RobotService {
    pub fn builder(
        driver: Arc<dyn LeggedDriver>,
        sensor: Arc<dyn DistanceSensor>,
    ) -> RobotServiceBuilder {
        RobotServiceBuilder {
            driver,
            sensor,
            config: ControlConfig::default(),
            bus: None,
            validator: None,
            seed: None,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Upper bound between a cancellation and the scheduler noticing it.
    pub fn max_cancel_latency(&self) -> Duration {
        self.inner.config.max_cancel_latency()
    }

    // ── Producers ───────────────────────────────────────────────────────────

    /// Queue a locomotion request.
    ///
    /// # Errors
    ///
    /// - [`StriderError::InvalidIntentKind`] when neither a complete vector
    ///   nor a complete angle/intensity pair is present, or a value is out of
    ///   range.
    /// - [`StriderError::QueueFull`] when the arbiter is busy.
    pub fn submit_move(&self, request: MoveRequest) -> Result<MoveAck, StriderError> {
        let payload = decode_move(&request)?;
        self.submit_move_payload(payload)
    }

    pub fn submit_move_payload(&self, payload: MovePayload) -> Result<MoveAck, StriderError> {
        let intent = Intent::manual(IntentPayload::Move(payload));
        self.inner.validator.validate(&intent)?;
        let directive = self.inner.resolver.resolve(&payload);

        let mut debouncer = lock(&self.inner.debouncer);
        if !debouncer.would_accept(&intent) {
            self.admit_manual(None)?;
            debug!(%directive, "move debounced");
            return Ok(MoveAck::Cached);
        }
        self.admit_manual(Some(intent.clone()))?;
        debouncer.record(&intent);
        Ok(MoveAck::Queued { directive })
    }

    /// Queue a head pan/tilt request.  Never debounced.
    pub fn submit_head(&self, head: HeadVector) -> Result<(), StriderError> {
        let intent = Intent::manual(IntentPayload::Head(head));
        self.inner.validator.validate(&intent)?;
        self.admit_manual(Some(intent))
    }

    /// Queue a named action.
    ///
    /// # Errors
    ///
    /// [`StriderError::UnknownAction`] when `name` is not a known action;
    /// [`StriderError::QueueFull`] when busy.
    pub fn submit_action(&self, name: &str) -> Result<ActionKind, StriderError> {
        let kind: ActionKind = name.parse()?;
        let intent = Intent::manual(IntentPayload::Action(kind));
        self.inner.validator.validate(&intent)?;
        self.admit_manual(Some(intent))?;
        Ok(kind)
    }

    /// Queue a routine leg stop.
    pub fn submit_stop(&self) -> Result<(), StriderError> {
        let intent = Intent::manual(IntentPayload::Stop { emergency: false });
        self.admit_manual(Some(intent))
    }

    /// Turn the autonomous routine on or off.  Idempotent; returns the
    /// resulting setting.
    pub fn set_autonomous(&self, enabled: bool) -> bool {
        if enabled {
            self.enable_autonomy()
        } else {
            self.disable_autonomy();
            false
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Never fails.
    pub fn status(&self) -> StatusSnapshot {
        let (mode, autonomous_enabled) = self.inner.state.mode_with_autonomy();
        StatusSnapshot {
            mode,
            autonomous_enabled,
            queue_depth: self.inner.arbiter.depth(),
            idle: self.inner.idle.is_idle(),
            worker_healthy: self.inner.watchdog.health(WORKER_COMPONENT)
                == ComponentHealth::Healthy,
        }
    }

    /// One distance reading; `None` on a sensor fault or timeout.
    pub async fn sensor_snapshot(&self) -> SensorSnapshot {
        read_snapshot(self.inner.sensor.as_ref(), self.inner.config.sensor_timeout()).await
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Cancel autonomy, stop the worker, discard queued intents, issue a
    /// final emergency stop and close the driver.  Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// The emergency stop's [`StriderError::ActuatorFault`], if any.  The
    /// robot is reported `Idle` regardless.
    pub async fn shutdown(&self) -> Result<(), StriderError> {
        if self.inner.shutdown.send_replace(true) {
            return Ok(());
        }
        info!("robot service shutting down");

        if self.inner.state.cancel_autonomy(CancelReason::Shutdown).is_some() {
            self.publish_autonomy(false);
        }
        let scheduler = lock(&self.inner.scheduler).take();
        if let Some(mut task) = scheduler {
            let grace = self.max_cancel_latency() * 2;
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!("autonomous routine did not exit in time, aborting");
                task.abort();
            }
        }

        let worker = lock(&self.inner.worker).take();
        let mut result = Ok(());
        if let Some(task) = worker {
            match task.await {
                Ok(mut gateway) => {
                    result = gateway.emergency_stop().await;
                    if let Err(err) = &result {
                        error!(%err, "final emergency stop failed");
                    }
                    if let Err(err) = gateway.close().await {
                        warn!(%err, "driver close failed");
                    }
                }
                Err(err) => error!(%err, "arbiter worker panicked"),
            }
        }

        if let Some((from, to)) = self.inner.state.force_idle(CancelReason::Shutdown) {
            self.publish_mode(from, to);
        }
        info!("robot service stopped");
        result
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Admit a manual intent (or, for `None`, only its side effect on an
    /// active session) and enqueue it.
    fn admit_manual(&self, intent: Option<Intent>) -> Result<(), StriderError> {
        let mut took_over = false;
        let result = self.inner.state.admit(Origin::Manual, |admission| {
            if let Admission::Takeover { session } = admission {
                took_over = true;
                self.queue_cleanup(
                    session,
                    &[
                        IntentPayload::Stop { emergency: false },
                        IntentPayload::Head(HeadVector::CENTER),
                    ],
                );
            }
            match intent {
                Some(intent) => self.inner.arbiter.try_submit(intent),
                None => Ok(()),
            }
        });
        if took_over {
            info!("manual command took over from the autonomous routine");
            self.publish_mode(RobotMode::Autonomous, RobotMode::Idle);
            self.publish_autonomy(false);
        }
        if let Err(err) = &result {
            warn!(%err, "manual intent not queued");
        }
        result
    }

    /// Best-effort; a full queue is logged, not retried.
    fn queue_cleanup(&self, session: u64, payloads: &[IntentPayload]) {
        let origin = Origin::Cleanup { session };
        for &payload in payloads {
            if let Err(err) = self.inner.arbiter.try_submit(Intent::new(payload, origin)) {
                warn!(session, %err, "cleanup intent not queued");
            }
        }
    }

    fn enable_autonomy(&self) -> bool {
        if self.is_shut_down() {
            warn!("autonomy requested after shutdown");
            return false;
        }
        let Some(session) = self.inner.state.enable_autonomy() else {
            return true;
        };

        let mut scheduler = AutonomyScheduler::new(
            session,
            Arc::clone(&self.inner.state),
            self.inner.arbiter.clone(),
            Arc::clone(&self.inner.sensor),
            self.inner.bus.clone(),
            self.inner.config.clone(),
        );
        if let Some(seed) = self.inner.seed {
            scheduler = scheduler.with_seed(seed.wrapping_add(session));
        }
        // A previous, cancelled routine is detached; it exits on its next
        // checkpoint.
        *lock(&self.inner.scheduler) = Some(tokio::spawn(scheduler.run()));

        self.publish_mode(RobotMode::Idle, RobotMode::Autonomous);
        self.publish_autonomy(true);
        true
    }

    fn disable_autonomy(&self) {
        let cancelled = self.inner.state.cancel_autonomy(CancelReason::Disabled);
        let Some(session) = cancelled else {
            return;
        };
        let origin = Origin::Cleanup { session };
        let queued = self.inner.state.admit(origin, |_| {
            self.inner
                .arbiter
                .try_submit(Intent::new(IntentPayload::Stop { emergency: true }, origin))
        });
        if let Err(err) = queued {
            warn!(session, %err, "emergency stop not queued");
        }
        self.publish_mode(RobotMode::Autonomous, RobotMode::Idle);
        self.publish_autonomy(false);
    }

    fn publish_mode(&self, from: RobotMode, to: RobotMode) {
        self.inner.bus.emit(
            Topic::SystemAlerts,
            Event::new(SOURCE, EventPayload::ModeChanged { from, to }),
        );
    }

    fn publish_autonomy(&self, enabled: bool) {
        self.inner.bus.emit(
            Topic::SystemAlerts,
            Event::new(SOURCE, EventPayload::AutonomyChanged { enabled }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_hal::{DriverCall, SimDriver, SimSensor};
    use strider_types::{Direction, Directive};

    struct Rig {
        service: RobotService,
        driver: Arc<SimDriver>,
    }

    fn rig_with(config: ControlConfig, driver: SimDriver, sensor: SimSensor) -> Rig {
        let driver = Arc::new(driver);
        let service = RobotService::builder(driver.clone(), Arc::new(sensor))
            .with_config(config)
            .with_seed(11)
            .start();
        Rig { service, driver }
    }

    fn rig() -> Rig {
        rig_with(ControlConfig::default(), SimDriver::new(), SimSensor::new(100.0))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn scheduler_finished(service: &RobotService) -> bool {
        lock(&service.inner.scheduler)
            .as_ref()
            .is_none_or(|task| task.is_finished())
    }

    #[tokio::test(start_paused = true)]
    async fn forward_vector_reaches_gateway_at_95() {
        let r = rig();
        let ack = r.service.submit_move(MoveRequest::vector(0.0, 0.8)).unwrap();
        assert_eq!(
            ack,
            MoveAck::Queued {
                directive: Directive {
                    direction: Direction::Forward,
                    speed: 95
                }
            }
        );
        settle().await;
        assert_eq!(r.driver.actions(), vec![("forward".to_string(), 95)]);
        assert_eq!(r.service.status().mode, RobotMode::Moving);
    }

    #[tokio::test(start_paused = true)]
    async fn small_vector_resolves_to_stop() {
        let r = rig();
        let ack = r.service.submit_move(MoveRequest::vector(0.05, 0.05)).unwrap();
        assert_eq!(ack, MoveAck::Queued { directive: Directive::STOP });
    }

    #[tokio::test(start_paused = true)]
    async fn identical_moves_inside_window_dispatch_once() {
        let r = rig();
        let first = r.service.submit_move(MoveRequest::vector(0.0, 0.8)).unwrap();
        let second = r.service.submit_move(MoveRequest::vector(0.0, 0.8)).unwrap();
        assert!(matches!(first, MoveAck::Queued { .. }));
        assert_eq!(second, MoveAck::Cached);
        settle().await;
        assert_eq!(r.driver.actions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_moves_are_rejected_before_queueing() {
        let r = rig();
        assert!(matches!(
            r.service.submit_move(MoveRequest::default()),
            Err(StriderError::InvalidIntentKind(_))
        ));
        assert!(matches!(
            r.service.submit_move(MoveRequest::vector(2.0, 0.0)),
            Err(StriderError::InvalidIntentKind(_))
        ));
        assert_eq!(r.service.status().queue_depth, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_action_is_reported() {
        let r = rig();
        assert_eq!(
            r.service.submit_action("unknown_trick"),
            Err(StriderError::UnknownAction("unknown_trick".to_string()))
        );
        assert_eq!(r.service.submit_action("sit"), Ok(ActionKind::Sit));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_queue_leaves_debounce_memory_untouched() {
        let config = ControlConfig {
            queue_capacity: 3,
            ..ControlConfig::default()
        };
        let r = rig_with(
            config,
            SimDriver::new().with_action_duration(Duration::from_secs(2)),
            SimSensor::new(100.0),
        );
        r.service.submit_action("stretch").unwrap();
        settle().await;
        for _ in 0..3 {
            r.service.submit_action("bark").unwrap();
        }

        assert_eq!(
            r.service.submit_move(MoveRequest::vector(0.0, 0.8)),
            Err(StriderError::QueueFull)
        );
        assert!(lock(&r.service.inner.debouncer).memory().last_accepted_at.is_none());

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        settle().await;
        assert!(r.service.submit_move(MoveRequest::vector(0.0, 0.8)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn set_autonomous_is_idempotent() {
        let r = rig();
        assert!(r.service.set_autonomous(true));
        assert!(r.service.set_autonomous(true));
        assert_eq!(r.service.inner.state.session().generation, 1);
        assert!(r.service.status().autonomous_enabled);

        assert!(!r.service.set_autonomous(false));
        assert!(!r.service.set_autonomous(false));
        assert_eq!(r.service.status().mode, RobotMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_command_takes_over_from_autonomy() {
        let r = rig();
        r.service.set_autonomous(true);
        settle().await;
        assert_eq!(r.service.status().mode, RobotMode::Autonomous);

        r.service.submit_action("sit").unwrap();
        let status = r.service.status();
        assert_eq!(status.mode, RobotMode::Idle);
        assert!(!status.autonomous_enabled);
        assert!(r.service.inner.state.session().cancel_requested);

        tokio::time::sleep(r.service.max_cancel_latency()).await;
        settle().await;
        assert!(scheduler_finished(&r.service));

        let calls = r.driver.calls();
        let head_center = calls
            .iter()
            .position(|c| matches!(c, DriverCall::HeadMove { .. }))
            .unwrap();
        let sit = calls
            .iter()
            .position(|c| matches!(c, DriverCall::Action { name, .. } if name == "sit"))
            .unwrap();
        assert!(head_center < sit, "cleanup must run before the manual intent");
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_autonomy_issues_emergency_stop() {
        let r = rig();
        r.service.set_autonomous(true);
        settle().await;
        r.driver.clear();

        r.service.set_autonomous(false);
        tokio::time::sleep(r.service.max_cancel_latency()).await;
        settle().await;

        let calls = r.driver.calls();
        assert!(calls.contains(&DriverCall::LegsStop));
        assert!(calls.iter().any(|c| matches!(c, DriverCall::HeadMove { .. })));
        assert!(scheduler_finished(&r.service));
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_fault_yields_empty_snapshot() {
        let r = rig_with(
            ControlConfig::default(),
            SimDriver::new(),
            SimSensor::new(42.0).then_fault("no echo"),
        );
        assert_eq!(r.service.sensor_snapshot().await.distance_cm, None);
        assert_eq!(r.service.sensor_snapshot().await.distance_cm, Some(42.0));
    }

    #[tokio::test(start_paused = true)]
    async fn status_stays_healthy_during_long_action() {
        let r = rig_with(
            ControlConfig::default(),
            SimDriver::new().with_action_duration(Duration::from_millis(4_500)),
            SimSensor::new(100.0),
        );
        r.service.submit_action("stretch").unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_millis(4_300)).await;

        let status = r.service.status();
        assert_eq!(status.mode, RobotMode::ExecutingAction);
        assert!(status.worker_healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_healthy_idle_worker() {
        let r = rig();
        settle().await;
        let status = r.service.status();
        assert_eq!(status.mode, RobotMode::Idle);
        assert!(status.idle);
        assert!(status.worker_healthy);
        assert_eq!(status.queue_depth, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything_once() {
        let r = rig();
        r.service.submit_move(MoveRequest::vector(0.0, 0.8)).unwrap();
        r.service.set_autonomous(true);
        settle().await;

        r.service.shutdown().await.unwrap();
        r.service.shutdown().await.unwrap();

        let status = r.service.status();
        assert_eq!(status.mode, RobotMode::Idle);
        assert!(!status.autonomous_enabled);
        assert!(!status.worker_healthy);
        assert!(!r.service.set_autonomous(true));

        let calls = r.driver.calls();
        assert_eq!(calls.last(), Some(&DriverCall::Close));
        assert_eq!(
            calls.iter().filter(|c| **c == DriverCall::Close).count(),
            1
        );
        assert_eq!(
            r.service.submit_stop(),
            Err(StriderError::Channel("arbiter worker has stopped".to_string()))
        );
    }
}
