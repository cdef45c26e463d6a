//! Command arbiter – a bounded intent queue drained by one worker task.
//!
//! Producers hold a cloneable [`ArbiterHandle`] and submit with
//! [`ArbiterHandle::try_submit`], which never blocks: a full queue is
//! reported as [`StriderError::QueueFull`] immediately.  The single
//! [`ArbiterWorker`] owns the [`ActuatorGateway`] and processes intents in
//! strict FIFO order, one at a time, so the actuator never sees two
//! overlapping commands.
//!
//! # Worker loop
//!
//! 1. Heartbeat the [`Watchdog`].
//! 2. Wait for the next intent, for at most `dequeue_timeout`, or for the
//!    shutdown signal.
//! 3. Drop the intent if it came from an autonomous session that is no longer
//!    live.
//! 4. Resolve and dispatch it through the gateway.
//! 5. Update the robot mode (`Moving` for a gait, `ExecutingAction` while an
//!    action plays, `Idle` after a stop or a finished action).  On an
//!    actuator fault, force `Idle` and end any autonomous session.
//!
//! On shutdown the worker discards whatever is still queued and hands the
//! gateway back to its caller for the final emergency stop.

use std::sync::Arc;
use std::time::Duration;

use strider_hal::ActuatorGateway;
use strider_kernel::{DirectionResolver, RobotStateMachine, Watchdog, head_pose};
use strider_middleware::{EventBus, Topic};
use strider_types::{
    CancelReason, Directive, Event, EventPayload, Intent, IntentPayload, Origin, RobotMode,
    StriderError,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Watchdog component name of the worker.
pub const WORKER_COMPONENT: &str = "arbiter";

const SOURCE: &str = "strider-runtime::arbiter";

/// Create the intent queue.  `capacity` is used as given; callers clamp it.
pub fn channel(capacity: usize) -> (ArbiterHandle, mpsc::Receiver<Intent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ArbiterHandle { tx }, rx)
}

// ────────────────────────────────────────────────────────────────────────────
// Producer side
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ArbiterHandle {
    tx: mpsc::Sender<Intent>,
}

impl ArbiterHandle {
    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// - [`StriderError::QueueFull`] when the queue is at capacity.
    /// - [`StriderError::Channel`] when the worker has stopped.
    pub fn try_submit(&self, intent: Intent) -> Result<(), StriderError> {
        self.tx.try_send(intent).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => StriderError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => {
                StriderError::Channel("arbiter worker has stopped".to_string())
            }
        })
    }

    /// Intents waiting in the queue (the one being dispatched is not counted).
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Worker
// ────────────────────────────────────────────────────────────────────────────

pub struct ArbiterWorker {
    rx: mpsc::Receiver<Intent>,
    gateway: ActuatorGateway,
    resolver: DirectionResolver,
    state: Arc<RobotStateMachine>,
    bus: EventBus,
    watchdog: Arc<Watchdog>,
    dequeue_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ArbiterWorker {
    /// Build the worker and register it with `watchdog` using
    /// `heartbeat_timeout` as its deadline.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: mpsc::Receiver<Intent>,
        gateway: ActuatorGateway,
        resolver: DirectionResolver,
        state: Arc<RobotStateMachine>,
        bus: EventBus,
        watchdog: Arc<Watchdog>,
        dequeue_timeout: Duration,
        heartbeat_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        watchdog.register(WORKER_COMPONENT, heartbeat_timeout);
        Self {
            rx,
            gateway,
            resolver,
            state,
            bus,
            watchdog,
            dequeue_timeout,
            shutdown,
        }
    }

    /// Drain the queue until shutdown is signalled or every handle is
    /// dropped, then return the gateway.
    pub async fn run(mut self) -> ActuatorGateway {
        info!("arbiter worker started");
        loop {
            self.watchdog.heartbeat(WORKER_COMPONENT);
            if *self.shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // Service dropped without an explicit shutdown.
                        break;
                    }
                    continue;
                }
                next = tokio::time::timeout(self.dequeue_timeout, self.rx.recv()) => next,
            };

            match next {
                Ok(Some(intent)) => self.process(intent).await,
                Ok(None) => break,
                Err(_) => continue,
            }
        }

        self.rx.close();
        let mut discarded = 0usize;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "arbiter shutting down with queued intents");
        }
        self.watchdog.deregister(WORKER_COMPONENT);
        info!("arbiter worker stopped");
        self.gateway
    }

    async fn process(&mut self, intent: Intent) {
        let kind = intent.kind();

        if let Origin::Autonomous { session } = intent.origin {
            if !self.state.is_live(session) {
                debug!(session, ?kind, "dropping intent of cancelled session");
                self.bus.emit(
                    Topic::HardwareCommands,
                    Event::new(
                        SOURCE,
                        EventPayload::IntentDropped {
                            intent: kind,
                            reason: format!("autonomous session {session} cancelled"),
                        },
                    ),
                );
                return;
            }
        }

        let outcome = match intent.payload {
            IntentPayload::Move(payload) => {
                let directive = self.resolver.resolve(&payload);
                self.gateway.dispatch(directive).await.map(|()| {
                    let mode = if directive.is_stop() {
                        RobotMode::Idle
                    } else {
                        RobotMode::Moving
                    };
                    (Some(mode), directive.to_string())
                })
            }
            IntentPayload::Head(head) => {
                let pose = head_pose(head);
                self.gateway.move_head(pose).await.map(|()| {
                    (
                        None,
                        format!("head yaw {:.1} pitch {:.1}", pose.yaw_deg, pose.pitch_deg),
                    )
                })
            }
            IntentPayload::Action(action) => {
                self.enter(RobotMode::ExecutingAction);
                self.gateway
                    .run_action(action, None)
                    .await
                    .map(|()| (Some(RobotMode::Idle), action.to_string()))
            }
            IntentPayload::Stop { emergency: true } => self
                .gateway
                .emergency_stop()
                .await
                .map(|()| (Some(RobotMode::Idle), "emergency stop".to_string())),
            IntentPayload::Stop { emergency: false } => self
                .gateway
                .dispatch(Directive::STOP)
                .await
                .map(|()| (Some(RobotMode::Idle), "stop".to_string())),
        };

        match outcome {
            Ok((mode, detail)) => {
                if let Some(mode) = mode {
                    self.enter(mode);
                }
                debug!(?kind, origin = ?intent.origin, %detail, "dispatched");
                self.bus.emit(
                    Topic::HardwareCommands,
                    Event::new(
                        SOURCE,
                        EventPayload::Dispatched {
                            intent: kind,
                            detail,
                        },
                    ),
                );
            }
            Err(err) => self.on_fault(err),
        }
    }

    fn enter(&self, mode: RobotMode) {
        if let Some((from, to)) = self.state.transition(mode) {
            self.bus.emit(
                Topic::SystemAlerts,
                Event::new(SOURCE, EventPayload::ModeChanged { from, to }),
            );
        }
    }

    fn on_fault(&self, err: StriderError) {
        error!(%err, "actuator fault, forcing idle");
        let was_autonomous = self.state.is_autonomous();
        if let Some((from, to)) = self.state.force_idle(CancelReason::ActuatorFault) {
            self.bus.emit(
                Topic::SystemAlerts,
                Event::new(SOURCE, EventPayload::ModeChanged { from, to }),
            );
        }
        if was_autonomous {
            self.bus.emit(
                Topic::SystemAlerts,
                Event::new(SOURCE, EventPayload::AutonomyChanged { enabled: false }),
            );
        }
        let (component, details) = match err {
            StriderError::ActuatorFault { component, details } => (component, details),
            other => ("gateway".to_string(), other.to_string()),
        };
        self.bus.emit(
            Topic::SystemAlerts,
            Event::new(SOURCE, EventPayload::ActuatorFault { component, details }),
        );
    }
}
