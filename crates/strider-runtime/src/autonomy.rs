//! [`AutonomyScheduler`] – the cancellable patrol routine.
//!
//! One scheduler task runs per autonomous session and repeats four phases
//! until the session is cancelled:
//!
//! | # | Phase | Behaviour |
//! |---|---|---|
//! | 0 | Vocalize | `bark`, hold `vocalize` (3 s) |
//! | 1 | Patrol | for `patrol` (10 s): read the distance sensor each cycle; below the obstacle threshold submit `Stop` then a turn (`kx = ±0.8`, random side) and hold `avoid_turn`; otherwise submit a forward step (`ky = 0.8`) and hold `patrol_cycle` |
//! | 2 | Rest | random pick of `lie_down`, `stretch`, `wag_tail`, `shake_head`, `bark`; hold `rest` (5 s) |
//! | 3 | Stand | `stand_up`, hold one patrol cycle |
//!
//! Every intent goes through the state machine's admission gate and the
//! arbiter queue, exactly like operator input.  A sensor fault or missing
//! echo is treated as a clear path.
//!
//! Cancellation is cooperative: holds are sliced into `poll_interval` sleeps
//! and the session is re-checked after each slice, after each sensor read,
//! and on every submission, so the task exits within
//! [`ControlConfig::max_cancel_latency`].  The stop-and-recenter for a manual
//! takeover or an explicit disable is queued by whoever cancelled the
//! session; the scheduler only queues it itself when the session ended on an
//! actuator fault.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strider_hal::{DistanceSensor, read_snapshot};
use strider_kernel::RobotStateMachine;
use strider_middleware::{EventBus, Topic};
use strider_types::{
    ActionKind, CancelReason, ControlConfig, Event, EventPayload, HeadVector, Intent,
    IntentPayload, MovePayload, Origin, StriderError,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::arbiter::ArbiterHandle;

/// Joystick deflection used for patrol steps and avoidance turns.
pub const PATROL_STEP: f32 = 0.8;

/// Static actions the rest phase picks from.
pub const REST_ACTIONS: [ActionKind; 5] = [
    ActionKind::LieDown,
    ActionKind::Stretch,
    ActionKind::WagTail,
    ActionKind::ShakeHead,
    ActionKind::Bark,
];

const SOURCE: &str = "strider-runtime::autonomy";

/// Returned through `?` once the session is no longer live.
#[derive(Debug)]
struct Cancelled;

type Step = Result<(), Cancelled>;

pub struct AutonomyScheduler {
    session: u64,
    state: Arc<RobotStateMachine>,
    arbiter: ArbiterHandle,
    sensor: Arc<dyn DistanceSensor>,
    bus: EventBus,
    config: ControlConfig,
    rng: StdRng,
}

impl AutonomyScheduler {
    pub fn new(
        session: u64,
        state: Arc<RobotStateMachine>,
        arbiter: ArbiterHandle,
        sensor: Arc<dyn DistanceSensor>,
        bus: EventBus,
        config: ControlConfig,
    ) -> Self {
        Self {
            session,
            state,
            arbiter,
            sensor,
            bus,
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Make turn sides and rest actions reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn max_cancel_latency(&self) -> Duration {
        self.config.max_cancel_latency()
    }

    /// Run phases until the session is cancelled.
    pub async fn run(mut self) {
        info!(session = self.session, "autonomous routine started");
        let mut cycles = 0u64;
        while self.cycle().await.is_ok() {
            cycles += 1;
            debug!(session = self.session, cycles, "autonomous cycle complete");
        }

        let session = self.state.session();
        if session.generation == self.session
            && session.cancel_reason == Some(CancelReason::ActuatorFault)
        {
            self.queue_cleanup();
        }
        info!(session = self.session, cycles, "autonomous routine exited");
    }

    async fn cycle(&mut self) -> Step {
        self.begin(0)?;
        self.submit(IntentPayload::Action(ActionKind::Bark))?;
        self.hold(self.config.vocalize()).await?;

        self.begin(1)?;
        self.patrol().await?;

        self.begin(2)?;
        let rest = REST_ACTIONS[self.rng.gen_range(0..REST_ACTIONS.len())];
        debug!(session = self.session, action = %rest, "resting");
        self.submit(IntentPayload::Action(rest))?;
        self.hold(self.config.rest()).await?;

        self.begin(3)?;
        self.submit(IntentPayload::Action(ActionKind::StandUp))?;
        self.hold(self.config.patrol_cycle()).await
    }

    async fn patrol(&mut self) -> Step {
        let deadline = Instant::now() + self.config.patrol();
        while Instant::now() < deadline {
            self.checkpoint()?;
            let reading = read_snapshot(self.sensor.as_ref(), self.config.sensor_timeout()).await;
            self.checkpoint()?;

            match reading.distance_cm {
                Some(cm) if cm < self.config.obstacle_threshold_cm => {
                    info!(distance_cm = cm, "obstacle ahead, turning away");
                    self.bus.emit(
                        Topic::Telemetry,
                        Event::new(SOURCE, EventPayload::ObstacleDetected { distance_cm: cm }),
                    );
                    self.submit(IntentPayload::Stop { emergency: false })?;
                    let x = if self.rng.gen_bool(0.5) {
                        PATROL_STEP
                    } else {
                        -PATROL_STEP
                    };
                    self.submit(IntentPayload::Move(MovePayload::Vector { x, y: 0.0 }))?;
                    self.hold(self.config.avoid_turn()).await?;
                }
                _ => {
                    self.submit(IntentPayload::Move(MovePayload::Vector {
                        x: 0.0,
                        y: PATROL_STEP,
                    }))?;
                    self.hold(self.config.patrol_cycle()).await?;
                }
            }
        }
        Ok(())
    }

    fn checkpoint(&self) -> Step {
        if self.state.should_continue(self.session) {
            Ok(())
        } else {
            Err(Cancelled)
        }
    }

    fn begin(&self, phase: usize) -> Step {
        self.checkpoint()?;
        self.state.begin_phase(self.session, phase);
        Ok(())
    }

    /// Sleep for `total`, re-checking the session every poll interval.
    async fn hold(&self, total: Duration) -> Step {
        let deadline = Instant::now() + total;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(self.config.poll_interval())).await;
        }
    }

    /// Queue one intent for this session.  A full queue skips the step.
    fn submit(&self, payload: IntentPayload) -> Step {
        let origin = Origin::Autonomous {
            session: self.session,
        };
        let result = self.state.admit(origin, |_| {
            self.arbiter.try_submit(Intent::new(payload, origin))
        });
        match result {
            Ok(()) => Ok(()),
            Err(StriderError::Preempted(_)) => Err(Cancelled),
            Err(err) => {
                warn!(%err, "autonomous intent not queued");
                Ok(())
            }
        }
    }

    fn queue_cleanup(&self) {
        let origin = Origin::Cleanup {
            session: self.session,
        };
        for payload in [
            IntentPayload::Stop { emergency: false },
            IntentPayload::Head(HeadVector::CENTER),
        ] {
            if let Err(err) = self
                .state
                .admit(origin, |_| self.arbiter.try_submit(Intent::new(payload, origin)))
            {
                warn!(%err, "cleanup intent not queued");
            }
        }
    }
}
