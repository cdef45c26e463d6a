//! `strider-kernel` – rule enforcement for the arbitration core.
//!
//! Nothing in this crate performs I/O.  It decides *what* may happen; the
//! runtime decides *when*.
//!
//! # Modules
//!
//! - [`resolver`] – [`DirectionResolver`][resolver::DirectionResolver]:
//!   maps joystick vectors and angle/intensity pairs onto a discrete
//!   [`Directive`][strider_types::Directive], plus the head-joystick mapping.
//! - [`validator`] – [`IntentValidator`][validator::IntentValidator]:
//!   ordered range rules every intent must satisfy before it is queued.
//! - [`debouncer`] – [`CommandDebouncer`][debouncer::CommandDebouncer]:
//!   suppresses locomotion samples that are both too soon and too similar.
//! - [`state_machine`] – [`RobotStateMachine`][state_machine::RobotStateMachine]:
//!   the single lock around the robot mode and the autonomous session;
//!   gates which producer may enqueue.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: heartbeat deadlines for
//!   the arbiter worker.

pub mod debouncer;
pub mod resolver;
pub mod state_machine;
pub mod validator;
pub mod watchdog;

pub use debouncer::{CommandDebouncer, DebounceMemory};
pub use resolver::{DirectionResolver, decode_move, head_pose};
pub use state_machine::{Admission, AutonomousSession, RobotStateMachine, Transition};
pub use validator::{HeadRangeRule, IntentValidator, MoveRangeRule, Rule};
pub use watchdog::{ComponentHealth, Watchdog};
